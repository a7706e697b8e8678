//! Discovery error types

use thiserror::Error;

/// Failures of the discovery backend itself.
///
/// A service with no healthy instances is not an error.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The resolver was given nothing to look up
    #[error("no services to resolve")]
    NoServices,

    /// Transport-level failure talking to the registry
    #[error("registry unreachable: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status
    #[error("registry query for {service} failed with status {status}")]
    Status { service: String, status: u16 },

    /// The configured agent address does not form a valid URL
    #[error("invalid registry address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    /// The registry answered with a body we could not read
    #[error("invalid registry response for {service}: {message}")]
    InvalidResponse { service: String, message: String },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
