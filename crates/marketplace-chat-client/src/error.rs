//! Chat client error types.

use thiserror::Error;

/// Marketplace chat client error type.
#[derive(Error, Debug)]
pub enum ChatClientError {
    /// Client id or API key not configured
    #[error("Write credentials missing: both client id and API key are required")]
    MissingCredentials,

    /// Base URL does not parse
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias using ChatClientError.
pub type ChatClientResult<T> = Result<T, ChatClientError>;
