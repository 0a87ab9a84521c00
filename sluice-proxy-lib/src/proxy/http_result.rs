use http::StatusCode;
use thiserror::Error;

use crate::admission::GateError;
use crate::proxy::pool::UpstreamError;

/// HTTP result type, T is typically a hyper::Response
/// HttpError is used to generate a synthetic error response
pub(crate) type HttpResult<T> = std::result::Result<T, HttpError>;

/// Non-standard status used when the admission gate cannot take a request
pub const SITE_OVERLOADED: u16 = 529;

/// Per-request failures. Each one turns into a synthetic response and never
/// propagates past the handler.
#[derive(Debug, Error, Clone)]
pub enum HttpError {
    #[error("Failed to read request body: {0}")]
    InvalidRequestBody(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(#[from] GateError),
}

impl HttpError {
    /// Fixed plain-text body sent to the client
    pub fn body(&self) -> &'static str {
        match self {
            HttpError::InvalidRequestBody(_) => "Bad Request",
            HttpError::UpstreamUnavailable(_) => "Proxy Error: Bad Gateway",
            HttpError::SchedulerUnavailable(_) => "Server Overloaded",
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            HttpError::InvalidRequestBody(_) => "invalid_request_body",
            HttpError::UpstreamUnavailable(e) => e.error_type(),
            HttpError::SchedulerUnavailable(e) => e.error_type(),
        }
    }
}

impl From<&HttpError> for StatusCode {
    fn from(e: &HttpError) -> StatusCode {
        match e {
            HttpError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            HttpError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            HttpError::SchedulerUnavailable(_) => StatusCode::from_u16(SITE_OVERLOADED)
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_each_failure_to_its_status() {
        let bad_gateway = HttpError::from(UpstreamError::Connect("refused".into()));
        assert_eq!(StatusCode::from(&bad_gateway), StatusCode::BAD_GATEWAY);
        assert_eq!(bad_gateway.body(), "Proxy Error: Bad Gateway");

        for gate in [GateError::Draining, GateError::Abandoned] {
            let overloaded = HttpError::from(gate);
            assert_eq!(StatusCode::from(&overloaded).as_u16(), 529);
            assert_eq!(overloaded.body(), "Server Overloaded");
        }

        let bad_body = HttpError::InvalidRequestBody("truncated".into());
        assert_eq!(StatusCode::from(&bad_body), StatusCode::BAD_REQUEST);
    }
}
