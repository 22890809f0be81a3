//! HTTP send client.

use crate::{ChatClientError, ChatClientResult};
use async_trait::async_trait;
use outreach_outbox::{MessageSender, SendOutcome};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default marketplace seller API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api-seller.ozon.ru";

pub const SEND_MESSAGE_PATH: &str = "/v3/chat/send/message";

/// Older endpoint, tried once when the current one answers 400 or 404.
pub const SEND_MESSAGE_FALLBACK_PATH: &str = "/v1/chat/send/message";

const MAX_ERROR_CHARS: usize = 500;

/// Chat client configuration.
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            api_key: String::new(),
            timeout_secs: 35,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Sends chat messages with write-scoped seller credentials.
pub struct ChatApiClient {
    http: Client,
    base_url: String,
    client_id: String,
    api_key: String,
}

impl ChatApiClient {
    pub fn new(config: ChatClientConfig) -> ChatClientResult<Self> {
        let client_id = config.client_id.trim().to_string();
        let api_key = config.api_key.trim().to_string();
        if client_id.is_empty() || api_key.is_empty() {
            return Err(ChatClientError::MissingCredentials);
        }

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url,
            client_id,
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `text` (trimmed) to `chat_id`, falling back to the older endpoint
    /// on 400/404.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> SendOutcome {
        let request = SendMessageRequest {
            chat_id,
            text: text.trim(),
        };

        let outcome = self.post(SEND_MESSAGE_PATH, &request).await;
        match outcome.status {
            Some(400) | Some(404) if !outcome.ok => {
                debug!(
                    chat_id = %chat_id,
                    status = ?outcome.status,
                    "Send endpoint rejected request, trying fallback endpoint"
                );
                self.post(SEND_MESSAGE_FALLBACK_PATH, &request).await
            }
            _ => outcome,
        }
    }

    async fn post(&self, path: &str, request: &SendMessageRequest<'_>) -> SendOutcome {
        let url = format!("{}{}", self.base_url, path);

        let response = match self
            .http
            .post(&url)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", &self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %url, error = %err, "Chat send transport failure");
                return SendOutcome::transport_error(err.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            return SendOutcome::delivered(status.as_u16());
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, status.as_u16());
        debug!(url = %url, status = status.as_u16(), error = %message, "Chat send rejected");
        SendOutcome::rejected(status.as_u16(), message)
    }
}

#[async_trait]
impl MessageSender for ChatApiClient {
    async fn send(&self, chat_id: &str, text: &str, idempotency_key: &str) -> SendOutcome {
        debug!(chat_id = %chat_id, idempotency_key = %idempotency_key, "Sending chat message");
        self.send_message(chat_id, text).await
    }
}

/// The `message` field of a JSON error body, else the raw body, capped.
fn error_message(body: &str, status: u16) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .filter(|message| !message.trim().is_empty());

    let message = from_json.unwrap_or_else(|| body.trim().to_string());
    if message.is_empty() {
        return format!("HTTP {status}");
    }
    message.chars().take(MAX_ERROR_CHARS).collect()
}
