//! Chat send primitive for the marketplace seller API.
//!
//! [`ChatApiClient`] implements [`outreach_outbox::MessageSender`]: it never
//! returns an error from `send`, it reports what happened as a
//! [`SendOutcome`](outreach_outbox::SendOutcome) so the worker can classify it.

mod client;
mod error;

pub use client::{ChatApiClient, ChatClientConfig, DEFAULT_BASE_URL, SEND_MESSAGE_PATH, SEND_MESSAGE_FALLBACK_PATH};
pub use error::{ChatClientError, ChatClientResult};
