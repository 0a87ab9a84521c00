use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::uri::Scheme;
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::Service;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::tls::build_tls_connector;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Opens plain TCP or TLS connections to the upstream for the pooled client.
#[derive(Clone)]
pub struct UpstreamConnector {
    http: HttpConnector,
    tls: Option<TlsConnector>,
}

impl UpstreamConnector {
    /// `tls` is only built when the upstream is HTTPS.
    pub fn new(config: &PoolConfig, https: bool) -> Result<Self> {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_keepalive(config.tcp_keepalive);
        http.set_connect_timeout(Some(config.connect_timeout));

        let tls = if https { Some(build_tls_connector(config.insecure_tls)?) } else { None };

        Ok(Self { http, tls })
    }
}

impl Service<Uri> for UpstreamConnector {
    type Response = UpstreamStream;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<UpstreamStream, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), BoxError>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        Box::pin(connect(self.http.clone(), self.tls.clone(), uri))
    }
}

async fn connect(
    mut http: HttpConnector,
    tls: Option<TlsConnector>,
    uri: Uri,
) -> std::result::Result<UpstreamStream, BoxError> {
    let wants_tls = uri.scheme() == Some(&Scheme::HTTPS);
    let host = uri
        .host()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
        .ok_or("upstream URI has no host")?;

    let tcp = http.call(uri).await?;

    match (wants_tls, tls) {
        (false, _) => Ok(UpstreamStream::Plain(tcp)),
        (true, Some(tls)) => {
            let server_name = ServerName::try_from(host)?;
            let stream = tls.connect(server_name, tcp.into_inner()).await?;
            Ok(UpstreamStream::Tls(TokioIo::new(stream)))
        }
        (true, None) => Err("HTTPS upstream requested without a TLS connector".into()),
    }
}

/// A connection to the upstream, plain or TLS.
pub enum UpstreamStream {
    Plain(TokioIo<TcpStream>),
    Tls(TokioIo<TlsStream<TcpStream>>),
}

impl Connection for UpstreamStream {
    fn connected(&self) -> Connected {
        match self {
            UpstreamStream::Plain(s) => s.connected(),
            UpstreamStream::Tls(_) => Connected::new(),
        }
    }
}

impl Read for UpstreamStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl Write for UpstreamStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            UpstreamStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_flush(cx),
            UpstreamStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            UpstreamStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            UpstreamStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
