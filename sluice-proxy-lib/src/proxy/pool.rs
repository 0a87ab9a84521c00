use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{PoolConfig, UpstreamTarget};
use crate::error::Result;
use crate::proxy::connector::UpstreamConnector;
use crate::proxy::headers::strip_hop_by_hop;
use crate::telemetry::Metrics;

pub type UpstreamClient = Client<UpstreamConnector, Full<Bytes>>;

/// An inbound request, fully read and detached from its connection.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Origin-form target, e.g. `/search?q=x`
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub arrived_at: Instant,
    pub peer: SocketAddr,
}

/// A complete upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why an exchange with the upstream failed. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Failed to build upstream request: {0}")]
    InvalidRequest(String),

    #[error("Upstream connection failed: {0}")]
    Connect(String),

    #[error("Upstream request failed: {0}")]
    Request(String),

    #[error("Failed to read upstream response body: {0}")]
    Body(String),

    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Upstream connection pool is closed")]
    PoolClosed,
}

impl UpstreamError {
    pub fn error_type(&self) -> &'static str {
        match self {
            UpstreamError::InvalidRequest(_) => "invalid_request",
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Request(_) => "request",
            UpstreamError::Body(_) => "body",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::PoolClosed => "pool_closed",
        }
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Keep-alive connection pool to the single upstream.
///
/// Connections are opened lazily and returned to the idle set after each
/// exchange. At most `max_connections` exchanges are in flight at once; callers
/// beyond that wait for a free connection. Up to `max_idle` idle connections are
/// kept and closed after `idle_timeout`.
pub struct UpstreamPool {
    client: UpstreamClient,
    target: UpstreamTarget,
    permits: Arc<Semaphore>,
    config: PoolConfig,
    metrics: Option<Arc<Metrics>>,
}

impl UpstreamPool {
    pub fn new(
        target: UpstreamTarget,
        config: PoolConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let connector = UpstreamConnector::new(&config, target.is_https())?;

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_timer(TokioTimer::new());
        builder.pool_idle_timeout(config.idle_timeout);
        builder.pool_max_idle_per_host(config.max_idle);
        let client = builder.build(connector);

        Ok(Self {
            client,
            target,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            metrics,
        })
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Connection slots not currently used by an exchange.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Send `request` to the upstream and read the whole response.
    ///
    /// The `Host` header is replaced by the upstream authority and hop-by-hop
    /// headers are dropped in both directions. Everything else passes through.
    pub async fn forward(
        &self,
        request: ForwardRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError> {
        let started = Instant::now();
        let timeout = self.config.request_timeout;

        let result = match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match (&result, &self.metrics) {
            (Ok(resp), Some(m)) => {
                m.record_upstream_response(resp.status.as_u16(), elapsed, resp.body.len() as u64)
            }
            (Err(e), Some(m)) => m.record_upstream_error(e.error_type(), elapsed),
            _ => {}
        }
        result
    }

    async fn exchange(
        &self,
        request: ForwardRequest,
    ) -> std::result::Result<UpstreamResponse, UpstreamError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| UpstreamError::PoolClosed)?;

        let uri = self
            .target
            .uri_for(&request.path_and_query)
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        headers.insert(HOST, self.target.host_header());

        let mut outbound = Request::builder()
            .method(request.method)
            .uri(uri)
            .body(Full::new(request.body))
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        *outbound.headers_mut() = headers;

        debug!(method = %outbound.method(), uri = %outbound.uri(), "forwarding to upstream");

        let response = self.client.request(outbound).await.map_err(|e| {
            if e.is_connect() {
                UpstreamError::Connect(describe(&e))
            } else {
                UpstreamError::Request(describe(&e))
            }
        })?;

        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| UpstreamError::Body(describe(&e)))?
            .to_bytes();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        Ok(UpstreamResponse { status: parts.status, headers, body })
    }
}
