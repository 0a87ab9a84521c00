use std::net::SocketAddr;
use std::time::Duration;

use super::upstream::UpstreamTarget;

/// Admission gate configuration
///
/// Immutable once the proxy starts. The gate releases at most one request per
/// [`GateConfig::min_interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Outbound rate ceiling in requests per second. Always > 0.
    pub requests_per_second: u32,
    /// Optional cap on requests released but not yet completed
    /// Default: None (only the release interval bounds concurrency)
    pub max_concurrent: Option<usize>,
}

impl GateConfig {
    pub fn new(requests_per_second: u32) -> Self {
        Self { requests_per_second, max_concurrent: None }
    }

    /// Minimum time between two releases: `1000 / requests_per_second` ms.
    pub fn min_interval(&self) -> Duration {
        let rps = u64::from(self.requests_per_second.max(1));
        Duration::from_nanos(1_000_000_000 / rps)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new(default_requests_per_second())
    }
}

/// Upstream connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of concurrent connections to the upstream
    /// Default: 200
    pub max_connections: usize,
    /// Idle connections kept open and ready for reuse
    /// Default: 20
    pub max_idle: usize,
    /// How long an idle connection stays in the pool before it is closed
    /// Default: 60 seconds
    pub idle_timeout: Duration,
    /// TCP keep-alive probe interval, None disables probes
    /// Default: 30 seconds
    pub tcp_keepalive: Option<Duration>,
    /// TCP connect timeout
    /// Default: 5 seconds
    pub connect_timeout: Duration,
    /// Upper bound for one upstream exchange (request sent + full response read)
    /// Default: 60 seconds
    pub request_timeout: Duration,
    /// Skip certificate validation for HTTPS upstreams.
    /// Only meant for upstreams addressed by raw IP that cannot present a
    /// verifiable name.
    /// Default: true
    pub insecure_tls: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_pool_max_connections(),
            max_idle: default_pool_max_idle(),
            idle_timeout: Duration::from_secs(default_pool_idle_timeout_secs()),
            tcp_keepalive: Some(Duration::from_secs(default_tcp_keepalive_secs())),
            connect_timeout: Duration::from_millis(default_connect_timeout_ms()),
            request_timeout: Duration::from_millis(default_upstream_timeout_ms()),
            insecure_tls: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Per-request arrival logs and periodic queue statistics.
    /// Startup and shutdown messages are always emitted.
    /// Default: false
    pub enabled: bool,
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// Can be overridden at runtime via RUST_LOG environment variable
    /// Default: "info"
    pub level: String,
    /// Period of the queue statistics log line
    /// Default: 5 seconds
    pub stats_interval: Duration,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_log_level(),
            stats_interval: Duration::from_secs(default_stats_interval_secs()),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Observability server port (metrics + health checks)
    /// Default: None (server disabled)
    pub metrics_port: Option<u16>,
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Address and port to listen on
    pub listen: SocketAddr,
    /// The single upstream every request is forwarded to
    pub upstream: UpstreamTarget,
    pub gate: GateConfig,
    pub pool: PoolConfig,
    /// Response cache TTL, None disables caching
    pub cache_ttl: Option<Duration>,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
    /// Deadline for draining queued and running requests on shutdown
    /// Default: 10 seconds
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Configuration with defaults for everything but the listen address and upstream.
    pub fn new(listen: SocketAddr, upstream: UpstreamTarget) -> Self {
        Self {
            listen,
            upstream,
            gate: GateConfig::default(),
            pool: PoolConfig::default(),
            cache_ttl: None,
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
            shutdown_timeout: Duration::from_secs(default_shutdown_timeout_secs()),
        }
    }
}

pub(crate) fn default_port() -> u16 {
    31401
}

pub(crate) fn default_requests_per_second() -> u32 {
    100
}

pub(crate) fn default_pool_max_connections() -> usize {
    200
}

pub(crate) fn default_pool_max_idle() -> usize {
    20
}

pub(crate) fn default_pool_idle_timeout_secs() -> u64 {
    60
}

pub(crate) fn default_tcp_keepalive_secs() -> u64 {
    30
}

pub(crate) fn default_connect_timeout_ms() -> u64 {
    5000
}

pub(crate) fn default_upstream_timeout_ms() -> u64 {
    60000
}

pub(crate) fn default_shutdown_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_stats_interval_secs() -> u64 {
    5
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
