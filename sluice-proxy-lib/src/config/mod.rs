mod args;
mod ttl;
mod types;
mod upstream;

pub use args::ProxyArgs;
pub use ttl::parse_ttl;
pub use types::{Config, GateConfig, LoggingConfig, PoolConfig, TelemetryConfig};
pub use upstream::UpstreamTarget;
