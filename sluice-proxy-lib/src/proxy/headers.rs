use std::net::SocketAddr;

use http::header::{self, HeaderName};
use http::HeaderMap;

/// `X-Forwarded-For` header name
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Marks responses served from the response cache
pub const X_CACHE: &str = "x-cache";

/// Headers that describe a single hop and are never relayed
pub const HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
///
/// Returns the number of header names removed.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) -> usize {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut removed = 0;
    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        if headers.remove(name).is_some() {
            removed += 1;
        }
    }
    for name in ["keep-alive", "proxy-connection"] {
        if headers.remove(name).is_some() {
            removed += 1;
        }
    }
    removed
}

/// Client address for logging: first `X-Forwarded-For` entry, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_owned)
}
