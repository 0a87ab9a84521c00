use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Metrics;
use crate::admission::AdmissionGate;

/// Report admission gate counters every `period` until `stop` is cancelled.
///
/// The `[QUEUE]` log line is only emitted when `log_enabled`; gauges are
/// updated either way.
pub async fn run_queue_stats(
    gate: AdmissionGate,
    period: Duration,
    log_enabled: bool,
    metrics: Option<Arc<Metrics>>,
    stop: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let counts = gate.counts();
                if let Some(ref m) = metrics {
                    m.record_gate_counts(&counts);
                }
                if log_enabled {
                    info!(
                        "[QUEUE] Running: {}, Queued: {}, Done: {}",
                        counts.running, counts.queued, counts.completed
                    );
                }
            }
        }
    }
}
