use thiserror::Error;

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Shutdown deadline elapsed with {queued} queued and {running} running requests")]
    ShutdownTimeout { queued: usize, running: usize },
}

impl ProxyError {
    /// Process exit code for errors that terminate the proxy.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProxyError::ShutdownTimeout { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
