use tokio::sync::watch;
use tracing::{info, warn};

/// Owner side of the shutdown flag.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

/// Observer side of the shutdown flag, handed to the driver.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create an untriggered flag.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// A new observer.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Ask the run to stop after the current record.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Trigger on Ctrl-C, or SIGTERM on Unix, from a background task.
    pub fn listen_for_signals(self) {
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        warn!(error = %err, "failed to listen for ctrl-c");
                        return;
                    }
                    info!("received ctrl-c; finishing current batch");
                }
                () = wait_for_sigterm() => {
                    info!("received SIGTERM; finishing current batch");
                }
            }
            self.trigger();
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Shutdown::new().signal()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown is requested. Pending forever if the owner is
    /// dropped without triggering.
    pub async fn wait(&mut self) {
        if self.receiver.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(err) => {
            warn!(error = %err, "failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_seen_by_every_signal() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.signal();
        let second = shutdown.signal();
        assert!(!first.is_triggered());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), first.wait())
            .await
            .expect("wait resolves after trigger");
        assert!(second.is_triggered());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let mut signal = ShutdownSignal::never();
        assert!(!signal.is_triggered());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.wait()).await;
        assert!(waited.is_err());
    }
}
