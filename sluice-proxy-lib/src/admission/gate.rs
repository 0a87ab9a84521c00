use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::ticket::{Admission, GateError};
use crate::config::GateConfig;
use crate::telemetry::Metrics;

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    enqueued_at: Instant,
    run: Box<dyn FnOnce() -> JobFuture + Send + 'static>,
}

/// Lifecycle of the gate. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Accepting and releasing work.
    Running,
    /// No new work accepted; queued work is still released.
    Draining,
    /// Nothing accepted, nothing left to release.
    Closed,
}

/// Point-in-time view of the gate's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateCounts {
    /// Submitted and waiting for release
    pub queued: usize,
    /// Released and not yet finished
    pub running: usize,
    /// Released and finished (successfully or not)
    pub completed: u64,
    /// Refused at submission or abandoned at the drain deadline
    pub rejected: u64,
}

/// Result of [`AdmissionGate::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue and running set emptied before the deadline.
    Drained,
    /// Deadline elapsed. `queued` tasks were abandoned, `running` were still in flight.
    TimedOut { queued: usize, running: usize },
}

impl DrainOutcome {
    pub fn is_drained(&self) -> bool {
        matches!(self, DrainOutcome::Drained)
    }
}

struct Inner {
    queue: VecDeque<Job>,
    state: GateState,
}

struct Shared {
    config: GateConfig,
    inner: Mutex<Inner>,
    running: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    /// Wakes the release loop when work is queued or the state changes.
    work_available: Notify,
    /// Wakes drain waiters and the concurrency limiter when a task finishes.
    settled: Notify,
    metrics: Option<Arc<Metrics>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_settled(&self) -> bool {
        let inner = self.lock();
        inner.queue.is_empty() && self.running.load(Ordering::SeqCst) == 0
    }

    /// Wait until the queue has a job (true) or the gate stopped with nothing left (false).
    async fn wait_for_work(&self) -> bool {
        loop {
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let inner = self.lock();
                if !inner.queue.is_empty() {
                    return true;
                }
                if inner.state != GateState::Running {
                    return false;
                }
            }
            notified.await;
        }
    }

    async fn wait_for_slot(&self) {
        let Some(limit) = self.config.max_concurrent else {
            return;
        };
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.running.load(Ordering::SeqCst) < limit {
                return;
            }
            notified.await;
        }
    }

    async fn wait_settled(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }

    /// Pop the head of the queue and count it as running in one step, so drain
    /// never observes a released job in neither place.
    fn release_next(&self) -> Option<Job> {
        let mut inner = self.lock();
        let job = inner.queue.pop_front()?;
        self.running.fetch_add(1, Ordering::SeqCst);
        Some(job)
    }
}

/// Marks a released task finished when dropped, even if the task panicked.
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
        self.0.completed.fetch_add(1, Ordering::SeqCst);
        self.0.settled.notify_waiters();
    }
}

/// FIFO admission gate that releases submitted tasks at a fixed maximum rate.
///
/// Tasks leave the queue strictly in submission order, at most one per
/// [`GateConfig::min_interval`]. Once released a task runs to completion on its
/// own tokio task; completions may finish in any order.
///
/// Cloning is cheap and every clone drives the same queue. The release loop
/// stops when the last clone is dropped.
#[derive(Clone)]
pub struct AdmissionGate {
    shared: Arc<Shared>,
    _stop: Arc<DropGuard>,
}

impl AdmissionGate {
    /// Create the gate and spawn its release loop. Must be called within a tokio runtime.
    pub fn new(config: GateConfig, metrics: Option<Arc<Metrics>>) -> Self {
        let shared = Arc::new(Shared {
            config,
            inner: Mutex::new(Inner { queue: VecDeque::new(), state: GateState::Running }),
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            work_available: Notify::new(),
            settled: Notify::new(),
            metrics,
        });

        let stop = CancellationToken::new();
        tokio::spawn(release_loop(Arc::clone(&shared), stop.clone()));

        Self { shared, _stop: Arc::new(stop.drop_guard()) }
    }

    pub fn config(&self) -> &GateConfig {
        &self.shared.config
    }

    /// Queue `task` for release.
    ///
    /// The task is enqueued before this function returns, so the call order of
    /// `submit` is the release order. While the gate is draining or closed the
    /// returned [`Admission`] resolves immediately to [`GateError::Draining`]
    /// and nothing is queued.
    pub fn submit<F, Fut, T>(&self, task: F) -> Admission<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Job {
            enqueued_at: Instant::now(),
            run: Box::new(move || {
                Box::pin(async move {
                    let output = task().await;
                    // Receiver may be gone if the caller disconnected.
                    let _ = tx.send(output);
                })
            }),
        };

        {
            let mut inner = self.shared.lock();
            if inner.state != GateState::Running {
                drop(inner);
                return Admission::rejected(self.refuse());
            }
            inner.queue.push_back(job);
        }

        self.shared.work_available.notify_one();
        Admission::queued(rx)
    }

    /// Refuse early when the gate no longer accepts work.
    ///
    /// Lets callers skip expensive preparation (reading a request body) for
    /// work that [`submit`](Self::submit) would reject anyway. A refusal is
    /// counted exactly like a rejected submission.
    pub fn check_accepting(&self) -> Result<(), GateError> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(self.refuse())
        }
    }

    fn refuse(&self) -> GateError {
        self.shared.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(ref m) = self.shared.metrics {
            m.record_gate_rejection(GateError::Draining.error_type());
        }
        debug!("admission gate not accepting, rejecting task");
        GateError::Draining
    }

    pub fn state(&self) -> GateState {
        self.shared.lock().state
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == GateState::Running
    }

    pub fn counts(&self) -> GateCounts {
        let queued = self.shared.lock().queue.len();
        GateCounts {
            queued,
            running: self.shared.running.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and wait for queued and running tasks to finish.
    ///
    /// Resolves when both are empty or when `deadline` elapses. On expiry the
    /// still-queued tasks are abandoned (their callers get
    /// [`GateError::Abandoned`]); running tasks are left alone. Calling this
    /// again while a drain is in progress only waits alongside it.
    pub async fn drain(&self, deadline: Duration) -> DrainOutcome {
        {
            let mut inner = self.shared.lock();
            if inner.state == GateState::Running {
                inner.state = GateState::Draining;
                info!(
                    queued = inner.queue.len(),
                    running = self.shared.running.load(Ordering::SeqCst),
                    "admission gate draining"
                );
            }
        }
        self.shared.work_available.notify_one();

        if tokio::time::timeout(deadline, self.shared.wait_settled())
            .await
            .is_ok()
        {
            self.shared.lock().state = GateState::Closed;
            self.shared.work_available.notify_one();
            return DrainOutcome::Drained;
        }

        let abandoned = {
            let mut inner = self.shared.lock();
            inner.state = GateState::Closed;
            std::mem::take(&mut inner.queue)
        };
        let queued = abandoned.len();
        // Dropping the jobs drops their result senders; callers observe Abandoned.
        drop(abandoned);

        if queued > 0 {
            self.shared
                .rejected
                .fetch_add(queued as u64, Ordering::Relaxed);
            if let Some(ref m) = self.shared.metrics {
                m.record_gate_rejections(queued as u64, GateError::Abandoned.error_type());
            }
        }
        self.shared.work_available.notify_one();
        self.shared.settled.notify_waiters();

        let running = self.shared.running.load(Ordering::SeqCst);
        warn!(queued, running, "admission gate drain deadline elapsed");
        DrainOutcome::TimedOut { queued, running }
    }
}

async fn release_loop(shared: Arc<Shared>, stop: CancellationToken) {
    let min_interval = shared.config.min_interval();
    let mut next_release: Option<Instant> = None;

    loop {
        let has_work = tokio::select! {
            _ = stop.cancelled() => break,
            has_work = shared.wait_for_work() => has_work,
        };
        if !has_work {
            break;
        }

        if let Some(at) = next_release {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep_until(at) => {}
            }
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = shared.wait_for_slot() => {}
        }

        // The queue can be emptied by a drain deadline while we were pacing.
        let Some(job) = shared.release_next() else {
            continue;
        };

        let released_at = Instant::now();
        next_release = Some(released_at + min_interval);

        if let Some(ref m) = shared.metrics {
            m.record_gate_release(released_at.duration_since(job.enqueued_at).as_secs_f64());
        }

        let guard = RunningGuard(Arc::clone(&shared));
        tokio::spawn(async move {
            let _guard = guard;
            (job.run)().await;
        });
    }

    debug!("admission gate release loop stopped");
}
