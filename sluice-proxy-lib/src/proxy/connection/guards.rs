use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::UpDownCounter;
use tokio::sync::Notify;

use crate::telemetry::Metrics;

#[derive(Default)]
struct TrackerInner {
    active: AtomicUsize,
    closed: Notify,
}

/// Counts open inbound connections so shutdown can wait for them to close.
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. It counts as open until the guard is dropped.
    pub fn track(&self, metrics: Option<&Arc<Metrics>>) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let connections_active = metrics.map(|m| {
            m.record_connection_opened();
            m.connections_active.clone()
        });
        ConnectionGuard { tracker: Arc::clone(&self.inner), connections_active }
    }

    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Resolves once no tracked connection is open.
    pub async fn wait_idle(&self) {
        loop {
            let closed = self.inner.closed.notified();
            tokio::pin!(closed);
            closed.as_mut().enable();
            if self.active() == 0 {
                return;
            }
            closed.await;
        }
    }
}

/// Guard to decrement active connections counter when dropped
/// Also wakes shutdown when the last connection closes
pub struct ConnectionGuard {
    tracker: Arc<TrackerInner>,
    connections_active: Option<UpDownCounter<i64>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(ref counter) = self.connections_active {
            counter.add(-1, &[]);
        }
        if remaining == 1 {
            self.tracker.closed.notify_waiters();
        }
    }
}
