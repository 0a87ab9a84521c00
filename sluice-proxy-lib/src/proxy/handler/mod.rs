mod request;

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Body;
use hyper::{Request, Response};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::admission::AdmissionGate;
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::Result;
use crate::proxy::headers::client_ip;
use crate::proxy::http_result::HttpResult;
use crate::proxy::pool::UpstreamPool;
use crate::proxy::synthetic_response::{synthetic_error_response, RespBody};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;
use request::{cached_response, read_request, upstream_response};

/// Per-request forwarding logic.
///
/// Owns the admission gate, the upstream pool and the optional response cache.
/// Built once at startup and shared by every connection.
pub struct ProxyService {
    gate: AdmissionGate,
    pool: Arc<UpstreamPool>,
    cache: Option<ResponseCache>,
    log_requests: bool,
    metrics: Option<Arc<Metrics>>,
}

impl ProxyService {
    pub fn new(
        gate: AdmissionGate,
        pool: UpstreamPool,
        cache: Option<ResponseCache>,
        log_requests: bool,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { gate, pool: Arc::new(pool), cache, log_requests, metrics }
    }

    /// Build the gate, pool and cache described by `config`. Needs a tokio runtime.
    pub fn from_config(config: &Config, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let pool = UpstreamPool::new(config.upstream.clone(), config.pool.clone(), metrics.clone())?;
        let gate = AdmissionGate::new(config.gate, metrics.clone());
        let cache = config.cache_ttl.map(ResponseCache::new);
        Ok(Self::new(gate, pool, cache, config.logging.enabled, metrics))
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn pool(&self) -> &UpstreamPool {
        &self.pool
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// Answer one inbound request. Always yields exactly one response.
    pub async fn handle<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<RespBody>
    where
        B: Body,
        B::Error: Display,
    {
        let started = Instant::now();
        let method = req.method().clone();

        if self.log_requests {
            info!(
                "[REQUEST] {} {} {}",
                client_ip(req.headers(), peer),
                req.method(),
                req.uri()
            );
        }

        let response = match self.dispatch(req, peer).await {
            Ok(response) => response,
            Err(e) => {
                if self.log_requests {
                    warn!(?peer, error = %e, "Proxy error");
                }
                if let Some(ref m) = self.metrics {
                    m.record_error(e.error_type());
                }
                synthetic_error_response(&e)
            }
        };

        if let Some(ref m) = self.metrics {
            m.record_request(
                method.as_str(),
                response.status().as_u16(),
                started.elapsed().as_secs_f64(),
            );
        }
        response
    }

    async fn dispatch<B>(&self, req: Request<B>, peer: SocketAddr) -> HttpResult<Response<RespBody>>
    where
        B: Body,
        B::Error: Display,
    {
        // A draining gate answers before the body is read.
        self.gate.check_accepting()?;
        let forward = read_request(req, peer).await?;

        let cache_key = self
            .cache
            .as_ref()
            .filter(|_| ResponseCache::is_cacheable(&forward.method))
            .map(|_| ResponseCache::key(&forward.method, &forward.path_and_query));

        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(hit) = cache.get(key) {
                self.record_cache(values::CACHE_HIT);
                return Ok(cached_response(hit));
            }
            self.record_cache(values::CACHE_MISS);
        }

        let pool = Arc::clone(&self.pool);
        let upstream = self
            .gate
            .submit(move || async move { pool.forward(forward).await })
            .await??;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            if cache.put(key, upstream.status, upstream.headers.clone(), upstream.body.clone()) {
                self.record_cache(values::CACHE_STORE);
            }
        }

        Ok(upstream_response(upstream))
    }

    fn record_cache(&self, result: &str) {
        if let Some(ref m) = self.metrics {
            m.record_cache(result);
        }
    }
}
