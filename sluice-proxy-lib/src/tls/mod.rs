pub mod connector;
mod verifier;

pub use connector::build_tls_connector;
