#![forbid(unsafe_code)]

//! `magbridge` binary: ingest a magnetico database or a `.torrent` tree into
//! bitmagnet JSON or Postgres.

#[tokio::main]
async fn main() {
    let code = magbridge_app::cli::run().await;
    std::process::exit(code);
}
