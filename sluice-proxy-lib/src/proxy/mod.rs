pub mod connection;
pub mod connector;
pub mod handler;
pub mod headers;
pub mod http_result;
pub mod pool;
pub mod server;
pub mod synthetic_response;

pub use connection::ConnectionTracker;
pub use handler::ProxyService;
pub use http_result::HttpError;
pub use pool::{ForwardRequest, UpstreamError, UpstreamPool, UpstreamResponse};
pub use server::accept_loop;
