//! Graceful shutdown controller.
//!
//! Listens for SIGINT/SIGTERM and broadcasts a shutdown signal to every
//! consume loop and server via a `tokio::sync::broadcast` channel.

use tokio::signal;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across a service's tasks.
///
/// Tasks call [`subscribe`](Self::subscribe) to get a receiver, then
/// `select!` on it between iterations. When shutdown is triggered (by OS
/// signal or programmatically), every receiver is notified.
#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                res = ctrl_c => { res?; tracing::info!("received SIGINT, shutting down"); }
                _ = terminate.recv() => { tracing::info!("received SIGTERM, shutting down"); }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await?;
            tracing::info!("received Ctrl-C, shutting down");
        }

        self.shutdown();
        Ok(())
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
