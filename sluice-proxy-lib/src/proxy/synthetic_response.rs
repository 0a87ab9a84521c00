use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::http_result::HttpError;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub fn full_body(bytes: Bytes) -> RespBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Plain-text response with a fixed body.
pub fn text_response(status: StatusCode, body: &'static str) -> Response<RespBody> {
    let mut res = Response::new(full_body(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    res.headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    res
}

/// Build the 4xx/5xx response that stands in for a failed request
pub(crate) fn synthetic_error_response(error: &HttpError) -> Response<RespBody> {
    text_response(StatusCode::from(error), error.body())
}
