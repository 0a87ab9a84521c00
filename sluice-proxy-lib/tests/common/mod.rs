//! Shared helpers: throwaway upstream servers and a proxy running on an ephemeral port.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use sluice_proxy_lib::config::{Config, UpstreamTarget};
use sluice_proxy_lib::{ProxyServer, ProxyService, Shutdown};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A request as the upstream received it
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A running test upstream
pub struct Backend {
    pub addr: SocketAddr,
    /// TCP connections accepted so far
    pub connections: Arc<AtomicUsize>,
    /// Every request received, in arrival order
    pub seen: Arc<Mutex<Vec<Seen>>>,
}

impl Backend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

pub fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status;
    res
}

/// Serve HTTP/1.1 on `io` with `handler`, recording requests into `seen`.
pub async fn serve_io<I, F, Fut>(io: I, handler: F, seen: Arc<Mutex<Vec<Seen>>>)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Fn(Seen) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let svc = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        let seen = Arc::clone(&seen);
        async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();
            let request =
                Seen { method: parts.method, uri: parts.uri, headers: parts.headers, body };
            if let Ok(mut all) = seen.lock() {
                all.push(request.clone());
            }
            Ok::<_, hyper::Error>(handler(request).await)
        }
    });
    let _ = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), svc)
        .await;
}

/// Spawn a plain HTTP upstream on an ephemeral port.
pub async fn spawn_backend<F, Fut>(handler: F) -> TestResult<Backend>
where
    F: Fn(Seen) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let connections = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&connections);
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_io(stream, handler.clone(), Arc::clone(&log)));
        }
    });

    Ok(Backend { addr, connections, seen })
}

/// Upstream that answers `200 OK` with body `OK` to everything.
pub async fn spawn_ok_backend() -> TestResult<Backend> {
    spawn_backend(|_| async { text(StatusCode::OK, "OK") }).await
}

/// An address nothing listens on.
pub async fn unused_addr() -> TestResult<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Proxy configuration on an ephemeral local port with fast timeouts.
pub fn proxy_config(upstream: &str) -> TestResult<Config> {
    let mut config = Config::new("127.0.0.1:0".parse()?, UpstreamTarget::parse(upstream)?);
    config.pool.connect_timeout = Duration::from_secs(2);
    config.pool.request_timeout = Duration::from_secs(10);
    Ok(config)
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub service: Arc<ProxyService>,
    pub handle: JoinHandle<sluice_proxy_lib::Result<()>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(config: Config) -> TestResult<RunningProxy> {
    let server = ProxyServer::bind(config).await?;
    let addr = server.local_addr()?;
    let shutdown = server.shutdown_handle();
    let service = server.service();
    let handle = tokio::spawn(server.run());
    Ok(RunningProxy { addr, shutdown, service, handle })
}

pub fn client() -> TestResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(15))
        .build()?)
}

/// Poll `condition` every 10ms until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
