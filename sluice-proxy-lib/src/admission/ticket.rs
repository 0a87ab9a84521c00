use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;

/// Reasons the admission gate did not run a submitted task
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The gate stopped accepting work (drain in progress or finished).
    #[error("Admission gate is draining")]
    Draining,

    /// The task was queued but the drain deadline passed before its release.
    #[error("Request abandoned before release")]
    Abandoned,
}

impl GateError {
    pub fn error_type(&self) -> &'static str {
        match self {
            GateError::Draining => "gate_draining",
            GateError::Abandoned => "gate_abandoned",
        }
    }
}

/// Pending outcome of a task submitted to the [`AdmissionGate`](super::AdmissionGate).
///
/// The task is already queued when this value exists; awaiting it only waits
/// for the result. Dropping it does not withdraw the task.
#[must_use = "the task runs regardless, but its result is lost unless awaited"]
pub struct Admission<T> {
    state: AdmissionState<T>,
}

enum AdmissionState<T> {
    Queued(oneshot::Receiver<T>),
    Rejected(GateError),
}

impl<T> Admission<T> {
    pub(super) fn queued(rx: oneshot::Receiver<T>) -> Self {
        Self { state: AdmissionState::Queued(rx) }
    }

    pub(super) fn rejected(err: GateError) -> Self {
        Self { state: AdmissionState::Rejected(err) }
    }

    /// True if the gate refused the task at submission time.
    pub fn is_rejected(&self) -> bool {
        matches!(self.state, AdmissionState::Rejected(_))
    }
}

impl<T> Future for Admission<T> {
    type Output = Result<T, GateError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            AdmissionState::Queued(rx) => Pin::new(rx)
                .poll(cx)
                .map(|res| res.map_err(|_| GateError::Abandoned)),
            AdmissionState::Rejected(err) => Poll::Ready(Err(*err)),
        }
    }
}
