pub mod health;
pub mod metrics;
pub mod metrics_handler;
pub mod server;
pub mod stats;
pub mod tracing;

pub use health::{health_check_response, live_check_response, ready_check_response};
pub use metrics::{init_metrics, Metrics};
pub use metrics_handler::handle_metrics;
pub use server::serve_observability;
pub use stats::run_queue_stats;
pub use tracing::init_tracing;
