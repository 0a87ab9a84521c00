//! Startup, serving and graceful shutdown.
//!
//! [`ProxyServer::bind`] builds everything and binds the listeners;
//! [`ProxyServer::run`] serves until the [`Shutdown`] handle is triggered,
//! then drains the admission gate within the configured deadline.

mod shutdown;
mod signals;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::admission::DrainOutcome;
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::proxy::{accept_loop, ConnectionTracker, ProxyService};
use crate::telemetry::{init_metrics, run_queue_stats, serve_observability, Metrics};

pub use shutdown::{Phase, Shutdown};
pub use signals::ShutdownSignals;

/// Time open connections get to flush their last response after the drain
const CONNECTION_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A bound, ready-to-run proxy.
pub struct ProxyServer {
    config: Arc<Config>,
    listener: TcpListener,
    observability: Option<(TcpListener, prometheus::Registry)>,
    service: Arc<ProxyService>,
    shutdown: Shutdown,
    metrics: Option<Arc<Metrics>>,
}

impl ProxyServer {
    /// Bind the inbound listener (and the observability listener when a metrics
    /// port is configured) and build the gate, pool and cache.
    pub async fn bind(config: Config) -> Result<Self> {
        let (metrics, observability) = match config.telemetry.metrics_port {
            Some(port) => {
                let (metrics, registry) = init_metrics()?;
                let addr = SocketAddr::new(config.listen.ip(), port);
                let listener = TcpListener::bind(addr).await?;
                (Some(metrics), Some((listener, registry)))
            }
            None => (None, None),
        };

        let service = Arc::new(ProxyService::from_config(&config, metrics.clone())?);
        let listener = TcpListener::bind(config.listen).await?;

        Ok(Self {
            config: Arc::new(config),
            listener,
            observability,
            service,
            shutdown: Shutdown::new(),
            metrics,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn observability_addr(&self) -> Option<SocketAddr> {
        self.observability
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Handle used to start the drain from a signal handler or a test.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn service(&self) -> Arc<ProxyService> {
        Arc::clone(&self.service)
    }

    /// Serve until shutdown is triggered, then drain.
    ///
    /// Returns [`ProxyError::ShutdownTimeout`] when queued or running requests
    /// were still pending at the drain deadline.
    pub async fn run(self) -> Result<()> {
        let Self { config, listener, observability, service, shutdown, metrics } = self;
        let background = CancellationToken::new();
        let gate = service.gate().clone();

        info!(
            listen = %listener.local_addr()?,
            target = %config.upstream,
            requests_per_second = config.gate.requests_per_second,
            min_interval_ms = config.gate.min_interval().as_secs_f64() * 1000.0,
            cache_ttl = ?config.cache_ttl,
            logging = config.logging.enabled,
            "Sluice proxy listening"
        );

        if config.logging.enabled || metrics.is_some() {
            tokio::spawn(run_queue_stats(
                gate.clone(),
                config.logging.stats_interval,
                config.logging.enabled,
                metrics.clone(),
                background.child_token(),
            ));
        }

        if let Some(ttl) = config.cache_ttl {
            tokio::spawn(purge_cache(Arc::clone(&service), ttl, background.child_token()));
        }

        if let Some((obs_listener, registry)) = observability {
            tokio::spawn(serve_observability(obs_listener, registry, gate.clone(), shutdown.clone()));
        }

        let connections = ConnectionTracker::new();
        let accepting = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&service),
            shutdown.clone(),
            connections.clone(),
            metrics,
        ));

        shutdown.draining().await;
        if let Err(e) = accepting.await {
            warn!(error = %e, "accept loop ended abnormally");
        }

        let counts = gate.counts();
        info!(
            queued = counts.queued,
            running = counts.running,
            deadline_secs = config.shutdown_timeout.as_secs_f64(),
            "Draining admission queue"
        );
        let outcome = gate.drain(config.shutdown_timeout).await;

        shutdown.mark_stopped();
        background.cancel();

        if tokio::time::timeout(CONNECTION_CLOSE_GRACE, connections.wait_idle())
            .await
            .is_err()
        {
            warn!(open = connections.active(), "Connections still open after shutdown grace period");
        }

        match outcome {
            DrainOutcome::Drained => {
                let counts = gate.counts();
                info!(completed = counts.completed, rejected = counts.rejected, "Server closed");
                Ok(())
            }
            DrainOutcome::TimedOut { queued, running } => {
                error!(queued, running, "Drain deadline elapsed, forcing shutdown");
                Err(ProxyError::ShutdownTimeout { queued, running })
            }
        }
    }
}

async fn purge_cache(service: Arc<ProxyService>, ttl: Duration, stop: CancellationToken) {
    let Some(cache) = service.cache() else {
        return;
    };
    let mut ticker = tokio::time::interval(ttl.max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = cache.len(), "purged expired cache entries");
                }
            }
        }
    }
}

/// Bind, install signal handlers and serve until SIGTERM/SIGINT has been handled.
pub async fn run(config: Config) -> Result<()> {
    let signals = ShutdownSignals::install()?;
    let server = ProxyServer::bind(config).await?;
    tokio::spawn(signals.forward_to(server.shutdown_handle()));
    server.run().await
}
