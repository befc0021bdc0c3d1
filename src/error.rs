//! Error types for the render/export pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the render/export pipeline
///
/// Only the final, most specific classification crosses a component
/// boundary; strategy-internal failures are caught and classified where
/// they happen. A degraded capture (preferred strategy failed, fallback
/// succeeded) is not an error and never appears here.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid credential
    #[error("Unauthorized")]
    Auth,

    /// Request shape, content, or template rejected
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A bounded upstream wait (page load, remote render) was exceeded
    #[error("Upstream timed out after {0}ms")]
    UpstreamTimeout(u64),

    /// Every capture strategy in the chain failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// Rendering failed before capture could start
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error with message passthrough
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "chrome")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Render(err.to_string())
    }
}
