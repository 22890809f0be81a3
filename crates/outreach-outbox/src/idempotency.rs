//! Admission requests and idempotency key derivation.

use chrono::{DateTime, Utc};
use outreach_store::OutreachJob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CUSTOM_TEMPLATE: &str = "custom";
const DEFAULT_TEMPLATE_VERSION: &str = "v1";
const SHORT_HASH_LEN: usize = 16;

/// Request to admit one proactive message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutreachJob {
    pub user_id: i64,
    pub chat_id: String,
    pub text: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_version: Option<String>,
    /// Caller-chosen identity. Blank counts as absent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Defaults to admission time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOutreachJob {
    pub fn new(user_id: i64, chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id: chat_id.into(),
            text: text.into(),
            template_id: None,
            template_version: None,
            idempotency_key: None,
            created_at: None,
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>, template_version: Option<String>) -> Self {
        self.template_id = Some(template_id.into());
        self.template_version = template_version;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// The key this request will be stored under.
    pub fn resolve_idempotency_key(&self) -> String {
        match self
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        {
            Some(key) => key.to_string(),
            None => derive_idempotency_key(
                self.user_id,
                &self.chat_id,
                self.template_id.as_deref(),
                self.template_version.as_deref(),
                &self.text,
            ),
        }
    }

    /// Fresh `queued` snapshot with its key resolved.
    pub fn into_job(self) -> OutreachJob {
        let key = self.resolve_idempotency_key();
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        OutreachJob::new(key, self.user_id, self.chat_id, self.text, created_at)
            .with_template(self.template_id, self.template_version)
    }
}

/// First 16 hex chars of SHA-256 over the trimmed text.
pub fn short_hash(text: &str) -> String {
    let mut digest = sha256_hex(text.trim());
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Deterministic key over the identity tuple of an intended send.
///
/// Same user, chat, template and normalized text always yield the same key;
/// changing any one of them yields a different one.
pub fn derive_idempotency_key(
    user_id: i64,
    chat_id: &str,
    template_id: Option<&str>,
    template_version: Option<&str>,
    text: &str,
) -> String {
    let material = format!(
        "{}:{}:{}:{}:{}",
        user_id,
        chat_id,
        template_id.unwrap_or(CUSTOM_TEMPLATE),
        template_version.unwrap_or(DEFAULT_TEMPLATE_VERSION),
        short_hash(text)
    );
    sha256_hex(&material)
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}
