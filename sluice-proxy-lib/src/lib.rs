#![forbid(unsafe_code)]

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod proxy;
pub mod telemetry;
pub mod tls;

pub use admission::{Admission, AdmissionGate, DrainOutcome, GateCounts, GateError, GateState};
pub use config::{Config, GateConfig, PoolConfig, ProxyArgs, UpstreamTarget};
pub use error::{ProxyError, Result};
pub use lifecycle::{run, ProxyServer, Shutdown};
pub use proxy::{ForwardRequest, ProxyService, UpstreamError, UpstreamPool, UpstreamResponse};
