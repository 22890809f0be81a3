//! Durable storage for outreach delivery.
//!
//! Three collections, each its own JSON file replaced atomically on every
//! mutation:
//!
//! - **Pending**: jobs not yet confirmed delivered, keyed by idempotency key
//! - **Sent-record**: idempotency keys already delivered, with an expiry
//! - **Dead-letter**: append-only log of terminally failed jobs
//!
//! The store is unbuffered: every mutating call has reached disk (fsync +
//! rename) before it returns. Every call also holds an advisory lock on the
//! store directory, so several processes may share the files safely.

mod atomic;
mod error;
mod lock;
mod models;
mod store;

pub use atomic::{atomic_write, SCHEMA_VERSION};
pub use error::{StoreError, StoreResult};
pub use models::{DeadLetterEntry, JobStatus, OutreachJob, ReasonCode};
pub use store::{DeliveryClaim, OutreachStore, StoreFiles, DEFAULT_SENT_RETENTION_DAYS};
