use std::sync::Arc;

use tokio::sync::watch;

/// Process lifecycle phase. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    /// Listener closed, admission gate draining
    Draining,
    /// Drain finished or timed out
    Stopped,
}

/// Shared shutdown state.
///
/// Every long-running task holds a clone and waits on [`Shutdown::draining`]
/// or [`Shutdown::stopped`]. A signal handler or a test moves it forward with
/// [`Shutdown::trigger`].
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Phase>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Start draining. Returns `false` when shutdown was already under way.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn mark_stopped(&self) {
        self.tx.send_if_modified(|phase| {
            if *phase == Phase::Stopped {
                false
            } else {
                *phase = Phase::Stopped;
                true
            }
        });
    }

    /// Resolves once shutdown has been triggered.
    pub async fn draining(&self) {
        self.wait_for(|phase| phase != Phase::Running).await;
    }

    /// Resolves once draining has finished.
    pub async fn stopped(&self) {
        self.wait_for(|phase| phase == Phase::Stopped).await;
    }

    async fn wait_for(&self, done: impl Fn(Phase) -> bool) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|phase| done(*phase)).await;
    }
}
