use std::fmt::Display;
use std::net::SocketAddr;

use http::header::HeaderValue;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Request, Response};
use tokio::time::Instant;

use crate::cache::CachedResponse;
use crate::proxy::headers::X_CACHE;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::pool::{ForwardRequest, UpstreamResponse};
use crate::proxy::synthetic_response::{full_body, RespBody};

/// Read the whole inbound request so it can wait in the admission queue
/// independently of its connection.
pub(crate) async fn read_request<B>(req: Request<B>, peer: SocketAddr) -> HttpResult<ForwardRequest>
where
    B: Body,
    B::Error: Display,
{
    let arrived_at = Instant::now();
    let (parts, body) = req.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| HttpError::InvalidRequestBody(e.to_string()))?
        .to_bytes();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or_else(|| "/".to_owned(), |pq| pq.as_str().to_owned());

    Ok(ForwardRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
        arrived_at,
        peer,
    })
}

pub(crate) fn upstream_response(upstream: UpstreamResponse) -> Response<RespBody> {
    let mut res = Response::new(full_body(upstream.body));
    *res.status_mut() = upstream.status;
    *res.headers_mut() = upstream.headers;
    res
}

pub(crate) fn cached_response(cached: CachedResponse) -> Response<RespBody> {
    let mut res = Response::new(full_body(cached.body));
    *res.status_mut() = cached.status;
    *res.headers_mut() = cached.headers;
    res.headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("HIT"));
    res
}
