//! Persisted outreach value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery state of an outreach job.
///
/// `queued -> sending -> {sent | queued | failed}`; `sent` and `failed` are
/// terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Sending,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job was not delivered. Exactly one per retry or terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Conversation is not on the seller's activation allow-list.
    NotActiveChat,
    /// The platform's reply window for this conversation has elapsed.
    OutOfWindow,
    /// HTTP 429.
    RateLimit,
    /// HTTP 401/403, or outreach disabled while the job was in flight.
    Auth,
    /// Transport failure with no status code.
    Network,
    Unknown,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotActiveChat => "NOT_ACTIVE_CHAT",
            Self::OutOfWindow => "OUT_OF_WINDOW",
            Self::RateLimit => "RATE_LIMIT",
            Self::Auth => "AUTH",
            Self::Network => "NETWORK",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one intended send, as stored in the Pending collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachJob {
    /// Stable identity of this intended send; never recomputed.
    pub idempotency_key: String,
    /// Seller account that owns the conversation.
    pub user_id: i64,
    pub chat_id: String,
    /// Final message text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    /// Send-primitive invocations made so far. Only ever increases.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutreachJob {
    /// Build a fresh `queued` job from its identity and payload.
    pub fn new(
        idempotency_key: String,
        user_id: i64,
        chat_id: String,
        text: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            idempotency_key,
            user_id,
            chat_id,
            text,
            template_id: None,
            template_version: None,
            status: JobStatus::Queued,
            reason_code: None,
            last_error: None,
            last_status: None,
            attempts: 0,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_template(mut self, template_id: Option<String>, template_version: Option<String>) -> Self {
        self.template_id = template_id;
        self.template_version = template_version;
        self
    }

    /// Move to `status` and bump `updated_at`.
    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Record the diagnostics of a failed or skipped attempt.
    pub fn record_failure(&mut self, reason: ReasonCode, error: Option<String>, status: Option<u16>) {
        self.reason_code = Some(reason);
        self.last_error = error;
        self.last_status = status;
        self.updated_at = Utc::now();
    }

    /// Mark delivered; a delivered job carries no reason code.
    pub fn mark_sent(&mut self, status: Option<u16>) {
        self.reason_code = None;
        self.last_error = None;
        self.last_status = status;
        self.transition(JobStatus::Sent);
    }

    /// Count one more send attempt.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = Utc::now();
        self.attempts
    }

    /// Dead-letter record for this job as it stands now.
    pub fn to_dead_letter(&self) -> DeadLetterEntry {
        DeadLetterEntry {
            idempotency_key: self.idempotency_key.clone(),
            user_id: self.user_id,
            chat_id: self.chat_id.clone(),
            template_id: self.template_id.clone(),
            template_version: self.template_version.clone(),
            reason_code: self.reason_code.unwrap_or(ReasonCode::Unknown),
            last_error: self.last_error.clone(),
            last_status: self.last_status,
            attempts: self.attempts,
            created_at: self.created_at,
            failed_at: Utc::now(),
        }
    }
}

/// Terminal failure kept for operator review. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub idempotency_key: String,
    pub user_id: i64,
    pub chat_id: String,
    pub template_id: Option<String>,
    pub template_version: Option<String>,
    pub reason_code: ReasonCode,
    pub last_error: Option<String>,
    pub last_status: Option<u16>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}
