//! Seams to the rest of the seller assistant.

use crate::error::SourceUnavailable;
use async_trait::async_trait;
use std::collections::HashSet;

/// Per-seller outreach preferences.
pub trait OutreachSettings: Send + Sync {
    /// `Err` when the settings cannot be read at all. Never report an
    /// unreadable source as "disabled".
    fn is_outreach_enabled(&self, user_id: i64) -> Result<bool, SourceUnavailable>;

    /// Seconds to wait after finishing a job for this user.
    fn pacing_interval_secs(&self, user_id: i64) -> u64;
}

/// Conversations a buyer has opened by writing first.
pub trait ActivationTracker: Send + Sync {
    fn activated_chat_ids(&self, user_id: i64) -> Result<HashSet<String>, SourceUnavailable>;
}

/// Result of one call to the send primitive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendOutcome {
    pub ok: bool,
    pub error: Option<String>,
    /// HTTP status, absent on transport failure.
    pub status: Option<u16>,
}

impl SendOutcome {
    pub fn delivered(status: u16) -> Self {
        Self {
            ok: true,
            error: None,
            status: Some(status),
        }
    }

    pub fn rejected(status: u16, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            status: Some(status),
        }
    }

    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            status: None,
        }
    }
}

/// Outbound chat message transport.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str, idempotency_key: &str) -> SendOutcome;
}
