use crate::admission::AdmissionGate;
use crate::lifecycle::Shutdown;
use crate::proxy::synthetic_response::text_response;
use crate::telemetry::{
    handle_metrics, health_check_response, live_check_response, ready_check_response,
};
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Serve the observability endpoints on `listener` until shutdown reaches `Stopped`.
///
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - 503 once the admission gate starts draining
/// - `/live` - Liveness check endpoint
///
/// Keeps answering while the proxy drains so orchestrators can watch readiness drop.
pub async fn serve_observability(
    listener: TcpListener,
    registry: Registry,
    gate: AdmissionGate,
    shutdown: Shutdown,
) {
    let registry = Arc::new(registry);
    if let Ok(addr) = listener.local_addr() {
        info!(?addr, "Observability server started (metrics + health checks)");
    }

    loop {
        tokio::select! {
            _ = shutdown.stopped() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let gate = gate.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = registry.clone();
                        let gate = gate.clone();
                        async move {
                            let result = match req.uri().path() {
                                "/health" => health_check_response(),
                                "/ready" => ready_check_response(&gate),
                                "/live" => live_check_response(),
                                "/metrics" => handle_metrics(&registry),
                                _ => {
                                    let res = text_response(StatusCode::NOT_FOUND, "Not Found");
                                    return Ok::<_, hyper::Error>(res);
                                }
                            };
                            Ok(result.unwrap_or_else(|e| {
                                warn!(error = %e, "Observability server: failed to build response");
                                let status = StatusCode::INTERNAL_SERVER_ERROR;
                                text_response(status, "Internal Server Error")
                            }))
                        }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
}
