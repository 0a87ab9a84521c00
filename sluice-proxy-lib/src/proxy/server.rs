use std::sync::Arc;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::lifecycle::Shutdown;
use crate::proxy::connection::ConnectionTracker;
use crate::proxy::handler::ProxyService;
use crate::telemetry::Metrics;

/// Accept inbound connections until shutdown is triggered, one task per connection.
///
/// The listener is dropped as soon as draining starts, so new connections are
/// refused. Open connections keep being served (new requests on them get 529
/// from the draining gate) and are closed gracefully once shutdown reaches
/// `Stopped`.
pub async fn accept_loop(
    listener: TcpListener,
    service: Arc<ProxyService>,
    shutdown: Shutdown,
    connections: ConnectionTracker,
    metrics: Option<Arc<Metrics>>,
) {
    let builder = ConnBuilder::new(TokioExecutor::new());

    loop {
        tokio::select! {
            _ = shutdown.draining() => {
                info!("Listener closed, no longer accepting connections");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = connections.track(metrics.as_ref());
                let builder = builder.clone();
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let service = Arc::clone(&service);
                        async move { Ok::<_, hyper::Error>(service.handle(req, peer).await) }
                    });

                    let conn = builder.serve_connection(TokioIo::new(stream), svc);
                    tokio::pin!(conn);

                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(e) = result {
                                debug!(?peer, error = %e, "serve_connection error");
                            }
                        }
                        _ = shutdown.stopped() => {
                            conn.as_mut().graceful_shutdown();
                            if let Err(e) = conn.await {
                                debug!(?peer, error = %e, "serve_connection error during shutdown");
                            }
                        }
                    }
                });
            }
        }
    }
}
