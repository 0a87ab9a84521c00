use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

use super::Shutdown;
use crate::error::{ProxyError, Result};

/// SIGTERM and SIGINT handlers, installed before the listener starts.
pub struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    pub fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
        })?;
        Ok(Self { sigterm, sigint })
    }

    /// Trigger `shutdown` on the first signal. Later signals are only logged.
    pub async fn forward_to(mut self, shutdown: Shutdown) {
        loop {
            let name = tokio::select! {
                _ = self.sigterm.recv() => "SIGTERM",
                _ = self.sigint.recv() => "SIGINT",
                _ = shutdown.stopped() => return,
            };

            if shutdown.trigger() {
                info!("Received {name}, shutting down gracefully...");
            } else {
                info!("Received {name} while already shutting down, ignoring");
            }
        }
    }
}
