//! Outbox error types.

use outreach_store::StoreError;
use thiserror::Error;

/// Outreach outbox error type.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Durable store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Rejected configuration
    #[error("Invalid outbox config: {0}")]
    InvalidConfig(String),
}

/// A collaborator could not answer right now.
///
/// Transient by definition: the worker keeps the job in Pending and asks
/// again later instead of deciding its fate on missing information.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{what} unavailable: {reason}")]
pub struct SourceUnavailable {
    pub what: &'static str,
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(what: &'static str, reason: impl Into<String>) -> Self {
        Self {
            what,
            reason: reason.into(),
        }
    }
}

/// Result type alias using OutboxError.
pub type OutboxResult<T> = Result<T, OutboxError>;
