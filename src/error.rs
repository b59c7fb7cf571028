//! Error types for the warehouse service

use std::io;

use thiserror::Error;

/// Result type alias for the warehouse service
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level errors (startup, configuration, I/O).
///
/// Per-request authorization failures are not represented here; they are
/// [`Denied`](crate::auth::Denied) values returned by the auth pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
