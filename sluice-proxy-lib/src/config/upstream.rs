use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderValue, Uri};

use crate::error::{ProxyError, Result};

/// The fixed upstream target, parsed once from the configured base URL.
///
/// A base URL may carry a path prefix (`http://10.0.0.5:8080/api`), which is
/// prepended to every forwarded path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl UpstreamTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let uri: Uri = url.trim().parse()?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::HTTP,
            Some("https") => Scheme::HTTPS,
            Some(other) => {
                return Err(ProxyError::Config(format!(
                    "Unsupported upstream scheme '{other}', expected http or https"
                )))
            }
            None => {
                return Err(ProxyError::Config(format!(
                    "Upstream URL '{url}' must include a scheme (http:// or https://)"
                )))
            }
        };

        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| ProxyError::Config(format!("Upstream URL '{url}' has no host")))?;
        let authority = without_userinfo(authority)?;

        if uri.query().is_some() {
            return Err(ProxyError::Config(format!(
                "Upstream URL '{url}' must not carry a query string"
            )));
        }

        let base_path = uri.path().trim_end_matches('/').to_string();

        Ok(Self { scheme, authority, base_path })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::HTTPS
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host(&self) -> &str {
        self.authority.host()
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Value used for the outbound `Host` header.
    pub fn host_header(&self) -> HeaderValue {
        // Authority is already validated as header-safe by the URI parser.
        HeaderValue::from_str(self.authority.as_str())
            .unwrap_or_else(|_| HeaderValue::from_static("localhost"))
    }

    /// Build the outbound URI for an inbound path and query.
    pub fn uri_for(&self, path_and_query: &str) -> std::result::Result<Uri, http::Error> {
        let pq = if path_and_query.is_empty() { "/" } else { path_and_query };

        let mut joined = String::with_capacity(self.base_path.len().saturating_add(pq.len()));
        joined.push_str(&self.base_path);
        if !pq.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(pq);

        let path_and_query: PathAndQuery = joined.parse()?;

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }
}

/// Drop any `user:pass@` prefix so credentials never reach the Host header.
fn without_userinfo(authority: Authority) -> Result<Authority> {
    if !authority.as_str().contains('@') {
        return Ok(authority);
    }
    let bare = match authority.port_u16() {
        Some(port) => format!("{}:{port}", authority.host()),
        None => authority.host().to_string(),
    };
    Ok(bare.parse()?)
}

impl std::fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}
