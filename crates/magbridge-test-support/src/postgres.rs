//! Disposable Postgres databases preloaded with the bitmagnet tables magbridge writes to.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::NoTls;
use tempfile::TempDir;
use url::Url;

/// Environment variable pointing at an externally managed server.
pub const DATABASE_URL_ENV: &str = "MAGBRIDGE_TEST_DATABASE_URL";

/// Subset of the bitmagnet schema touched by the database sink.
pub const BITMAGNET_SCHEMA: &str = r"
CREATE TYPE files_status AS ENUM ('no_info', 'single', 'multi', 'over_threshold');

CREATE TABLE torrent_sources (
    key        text PRIMARY KEY,
    name       text NOT NULL,
    created_at timestamptz NOT NULL,
    updated_at timestamptz NOT NULL
);

CREATE TABLE torrents (
    info_hash    bytea PRIMARY KEY,
    name         text NOT NULL,
    size         bigint NOT NULL,
    private      boolean NOT NULL,
    created_at   timestamptz NOT NULL,
    updated_at   timestamptz NOT NULL,
    files_status files_status NOT NULL,
    extension    text,
    files_count  integer
);

CREATE TABLE torrents_torrent_sources (
    source       text NOT NULL REFERENCES torrent_sources (key) ON DELETE CASCADE,
    info_hash    bytea NOT NULL REFERENCES torrents (info_hash) ON DELETE CASCADE,
    import_id    text,
    bfsd         bytea,
    bfpe         bytea,
    seeders      integer,
    leechers     integer,
    published_at timestamptz NOT NULL,
    created_at   timestamptz NOT NULL,
    updated_at   timestamptz NOT NULL,
    PRIMARY KEY (source, info_hash)
);

CREATE TABLE torrent_files (
    info_hash  bytea NOT NULL REFERENCES torrents (info_hash) ON DELETE CASCADE,
    index      integer NOT NULL,
    path       text NOT NULL,
    extension  text,
    size       bigint NOT NULL,
    created_at timestamptz NOT NULL,
    updated_at timestamptz NOT NULL,
    PRIMARY KEY (info_hash, path)
);

CREATE TABLE torrent_contents (
    id               text GENERATED ALWAYS AS (
        encode(info_hash, 'hex') || ':' || coalesce(content_type, '') || ':' ||
        coalesce(content_source, '') || ':' || coalesce(content_id, '')
    ) STORED PRIMARY KEY,
    info_hash        bytea NOT NULL REFERENCES torrents (info_hash) ON DELETE CASCADE,
    content_type     text,
    content_source   text,
    content_id       text,
    languages        jsonb,
    episodes         jsonb,
    video_resolution text,
    video_source     text,
    video_codec      text,
    video_3d         text,
    video_modifier   text,
    release_group    text,
    created_at       timestamptz NOT NULL,
    updated_at       timestamptz NOT NULL,
    tsv              tsvector
);
";

/// Handle to a disposable database; dropped databases and servers are torn down.
pub struct TestDatabase {
    connection_string: String,
    server: Option<LocalServer>,
    cleanup: Option<Cleanup>,
}

impl TestDatabase {
    /// Connection string usable with `sqlx`.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Split the connection string into the parts a sink configuration takes.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection string is not a usable URL.
    pub fn connection_parts(&self) -> Result<ConnectionParts> {
        let url = Url::parse(&self.connection_string).context("invalid postgres connection url")?;
        Ok(ConnectionParts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5432),
            database: url.path().trim_start_matches('/').to_string(),
            user: if url.username().is_empty() {
                "postgres".to_string()
            } else {
                url.username().to_string()
            },
            password: url.password().map(str::to_string),
        })
    }
}

/// Host, port, and credentials of a [`TestDatabase`].
#[derive(Debug, Clone)]
pub struct ConnectionParts {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Login role.
    pub user: String,
    /// Password, when the URL carries one.
    pub password: Option<String>,
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Some(cleanup) = &self.cleanup {
            let _ = run_admin(
                &cleanup.admin_url,
                format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", cleanup.database),
            );
        }
        if let Some(server) = &mut self.server {
            let _ = server.process.kill();
            let _ = server.process.wait();
        }
    }
}

struct LocalServer {
    process: Child,
    _data_dir: TempDir,
}

struct Cleanup {
    admin_url: String,
    database: String,
}

/// Start a disposable database with [`BITMAGNET_SCHEMA`] applied.
///
/// Uses [`DATABASE_URL_ENV`] when set; otherwise spawns a throwaway server
/// from local `initdb`/`postgres`/`pg_isready` binaries. Callers skip their
/// test when this returns an error.
///
/// # Errors
///
/// Returns an error when no server can be reached or started, or the schema
/// fails to apply.
pub fn start_postgres() -> Result<TestDatabase> {
    let (base_url, server) = match std::env::var(DATABASE_URL_ENV) {
        Ok(url) => (url, None),
        Err(_) => {
            let (url, server) = spawn_local_server()?;
            (url, Some(server))
        }
    };

    let base = Url::parse(&base_url).context("invalid postgres connection url")?;
    let database = unique_database_name();
    let mut admin = base.clone();
    admin.set_path("/postgres");
    let admin_url = admin.to_string();
    run_admin(&admin_url, format!("CREATE DATABASE \"{database}\""))?;

    let mut target = base;
    target.set_path(&format!("/{database}"));
    let connection_string = target.to_string();
    let handle = TestDatabase {
        connection_string,
        server,
        cleanup: Some(Cleanup {
            admin_url,
            database,
        }),
    };
    run_admin(handle.connection_string(), BITMAGNET_SCHEMA.to_string())
        .context("failed to apply bitmagnet schema")?;
    Ok(handle)
}

// The blocking `postgres` client owns its own runtime, so it must not run on a tokio worker.
fn run_admin(url: &str, sql: String) -> Result<()> {
    let url = url.to_string();
    thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&url)?;
        let mut client = config.connect(NoTls)?;
        client
            .batch_execute(&sql)
            .context("failed to execute admin statement")
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow!("admin connection thread panicked")))
}

fn spawn_local_server() -> Result<(String, LocalServer)> {
    let initdb = find_binary("initdb")?;
    let postgres = find_binary("postgres")?;
    let pg_isready = find_binary("pg_isready")?;

    let data_dir = tempfile::Builder::new()
        .prefix("magbridge-pg-")
        .tempdir()
        .context("failed to create postgres data directory")?;
    let data_path = data_dir
        .path()
        .to_str()
        .context("data dir contains non-utf8 characters")?
        .to_string();

    let status = Command::new(&initdb)
        .args(["-D", &data_path, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !status.success() {
        bail!("initdb exited with failure status");
    }

    let port = free_port()?;
    let process = Command::new(&postgres)
        .args(["-D", &data_path, "-p", &port.to_string(), "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres process")?;
    let mut server = LocalServer {
        process,
        _data_dir: data_dir,
    };

    if let Err(err) = wait_until_ready(&pg_isready, port) {
        let _ = server.process.kill();
        let _ = server.process.wait();
        return Err(err);
    }
    Ok((format!("postgres://postgres@127.0.0.1:{port}/postgres"), server))
}

fn find_binary(name: &str) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map_or_else(Vec::new, |paths| std::env::split_paths(&paths).collect());
    dirs.extend(
        ["/usr/lib/postgresql/16/bin", "/usr/lib/postgresql/15/bin", "/usr/local/bin"]
            .into_iter()
            .map(PathBuf::from),
    );
    dirs.into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| anyhow!("{name} binary is required for Postgres tests"))
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    Ok(listener
        .local_addr()
        .context("failed to read listener address")?
        .port())
}

fn wait_until_ready(pg_isready: &Path, port: u16) -> Result<()> {
    for _ in 0..50 {
        let ready = Command::new(pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port.to_string(), "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success());
        if ready {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(200));
    }
    bail!("postgres process did not become ready in time")
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("magbridge_test_{}_{nanos}", std::process::id())
}
