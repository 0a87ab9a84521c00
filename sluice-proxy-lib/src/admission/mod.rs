//! Rate-limited FIFO admission of upstream work.
//!
//! Every forwarded request passes through a single [`AdmissionGate`]. The gate
//! queues work in arrival order and releases it no faster than the configured
//! requests-per-second, optionally capping how many released tasks may run at
//! once. On shutdown it is drained: new work is refused and queued work is
//! given until a deadline to finish.

mod gate;
mod ticket;

pub use gate::{AdmissionGate, DrainOutcome, GateCounts, GateState};
pub use ticket::{Admission, GateError};
