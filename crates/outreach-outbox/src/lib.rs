//! Outreach delivery: one proactive message per buyer conversation, exactly
//! once where the store can tell, across restarts and marketplace flakiness.
//!
//! This crate provides:
//! - OutreachGate: fire-and-forget admission with idempotency and de-duplication
//! - DeliveryWorker: rate-limited, retrying, cancellable delivery loop
//! - Collaborator traits for settings, activation and the send primitive
//!
//! State lives in [`outreach_store::OutreachStore`].

mod classify;
mod collaborators;
mod config;
mod error;
mod gate;
mod idempotency;
mod outbox;
mod queue;
mod worker;

#[cfg(test)]
mod tests;

pub use classify::{classify_failure, is_retryable, RETRYABLE_STATUSES};
pub use collaborators::{ActivationTracker, MessageSender, OutreachSettings, SendOutcome};
pub use config::OutreachConfig;
pub use error::{OutboxError, OutboxResult, SourceUnavailable};
pub use gate::{Admission, OutreachGate};
pub use idempotency::{derive_idempotency_key, short_hash, NewOutreachJob};
pub use outbox::OutreachOutbox;
pub use worker::DeliveryWorker;

/// Stock post-delivery thank-you sent when the caller has no text of its own.
pub const DEFAULT_OUTREACH_TEXT: &str = "Спасибо, что выбрали нас! Если что-то нужно уточнить по товару или эксплуатации — \
пишите в этот чат, ответим оперативно. Хорошего дня и будем рады вашему следующему заказу.";
