use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use super::ttl::parse_ttl;
use super::types::{
    default_connect_timeout_ms, default_log_level, default_pool_idle_timeout_secs,
    default_pool_max_connections, default_pool_max_idle, default_port,
    default_requests_per_second, default_shutdown_timeout_secs, default_stats_interval_secs,
    default_tcp_keepalive_secs, default_upstream_timeout_ms, Config, GateConfig, LoggingConfig,
    PoolConfig, TelemetryConfig,
};
use super::upstream::UpstreamTarget;
use crate::error::{ProxyError, Result};

/// Command line and environment settings.
///
/// Every flag is also read from the environment variable named next to it, so
/// the proxy can be configured entirely from a process manager's env block.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Sluice rate-shaping forward proxy")]
pub struct ProxyArgs {
    /// Port to accept inbound HTTP connections on
    #[arg(long, env = "PORT", default_value_t = default_port())]
    pub port: u16,

    /// Address to bind the inbound listener to
    #[arg(long, env = "LISTEN_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_addr: IpAddr,

    /// Upstream base URL, e.g. http://10.0.0.5:8080
    #[arg(long = "target", env = "TARGET_SERVER_URL", value_name = "URL")]
    pub target_server_url: Option<String>,

    /// Maximum number of requests released to the upstream per second
    #[arg(long, env = "REQUESTS_PER_SECOND", default_value_t = default_requests_per_second())]
    pub requests_per_second: u32,

    /// Upper bound on requests running against the upstream at once
    #[arg(long, env = "MAX_CONCURRENT")]
    pub max_concurrent: Option<usize>,

    /// Log every request and periodic queue statistics
    #[arg(
        long,
        env = "ENABLE_LOGGING",
        default_value = "false",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub enable_logging: bool,

    /// Tracing filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value_t = default_log_level())]
    pub log_level: String,

    /// Period of the queue statistics log line, in seconds
    #[arg(long, env = "STATS_INTERVAL_SECS", default_value_t = default_stats_interval_secs())]
    pub stats_interval_secs: u64,

    /// Cache successful GET/HEAD responses for this long, e.g. "10 seconds"
    #[arg(long, env = "CACHE_TTL")]
    pub cache_ttl: Option<String>,

    /// Maximum number of concurrent upstream connections
    #[arg(long, env = "POOL_MAX_CONNECTIONS", default_value_t = default_pool_max_connections())]
    pub pool_max_connections: usize,

    /// Idle upstream connections kept ready for reuse
    #[arg(long, env = "POOL_MAX_IDLE", default_value_t = default_pool_max_idle())]
    pub pool_max_idle: usize,

    /// Seconds an idle upstream connection is kept before closing
    #[arg(long, env = "POOL_IDLE_TIMEOUT_SECS", default_value_t = default_pool_idle_timeout_secs())]
    pub pool_idle_timeout_secs: u64,

    /// TCP keep-alive probe interval in seconds, 0 disables probes
    #[arg(long, env = "TCP_KEEPALIVE_SECS", default_value_t = default_tcp_keepalive_secs())]
    pub tcp_keepalive_secs: u64,

    /// Upstream TCP connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value_t = default_connect_timeout_ms())]
    pub connect_timeout_ms: u64,

    /// Upper bound for one upstream exchange in milliseconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value_t = default_upstream_timeout_ms())]
    pub upstream_timeout_ms: u64,

    /// Accept any certificate from an HTTPS upstream
    #[arg(
        long,
        env = "UPSTREAM_TLS_INSECURE",
        default_value = "true",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set
    )]
    pub upstream_tls_insecure: bool,

    /// Seconds to wait for queued and running requests on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = default_shutdown_timeout_secs())]
    pub shutdown_timeout_secs: u64,

    /// Port for the observability server (/metrics, /health, /ready, /live)
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl TryFrom<ProxyArgs> for Config {
    type Error = ProxyError;

    fn try_from(args: ProxyArgs) -> Result<Self> {
        let target = args
            .target_server_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ProxyError::ConfigMissing("TARGET_SERVER_URL"))?;
        let upstream = UpstreamTarget::parse(target)?;

        if args.requests_per_second == 0 {
            return Err(ProxyError::Config("REQUESTS_PER_SECOND must be > 0".to_string()));
        }
        if args.max_concurrent == Some(0) {
            return Err(ProxyError::Config("MAX_CONCURRENT must be > 0".to_string()));
        }
        if args.pool_max_connections == 0 {
            return Err(ProxyError::Config("POOL_MAX_CONNECTIONS must be > 0".to_string()));
        }
        if args.connect_timeout_ms == 0 || args.upstream_timeout_ms == 0 {
            return Err(ProxyError::Config("upstream timeouts must be > 0".to_string()));
        }
        if args.stats_interval_secs == 0 {
            return Err(ProxyError::Config("STATS_INTERVAL_SECS must be > 0".to_string()));
        }

        let cache_ttl = args.cache_ttl.as_deref().map(parse_ttl).transpose()?;

        Ok(Config {
            listen: SocketAddr::new(args.listen_addr, args.port),
            upstream,
            gate: GateConfig {
                requests_per_second: args.requests_per_second,
                max_concurrent: args.max_concurrent,
            },
            pool: PoolConfig {
                max_connections: args.pool_max_connections,
                max_idle: args.pool_max_idle,
                idle_timeout: Duration::from_secs(args.pool_idle_timeout_secs),
                tcp_keepalive: (args.tcp_keepalive_secs > 0)
                    .then(|| Duration::from_secs(args.tcp_keepalive_secs)),
                connect_timeout: Duration::from_millis(args.connect_timeout_ms),
                request_timeout: Duration::from_millis(args.upstream_timeout_ms),
                insecure_tls: args.upstream_tls_insecure,
            },
            cache_ttl,
            logging: LoggingConfig {
                enabled: args.enable_logging,
                level: args.log_level,
                stats_interval: Duration::from_secs(args.stats_interval_secs),
            },
            telemetry: TelemetryConfig { metrics_port: args.metrics_port },
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}
