//! Integration tests for the outreach outbox.
//!
//! - `harness.rs`      - Mock collaborators and temp-dir store
//! - `enqueue.rs`      - Admission: de-duplication, disabled sellers, overflow
//! - `delivery.rs`     - Happy path, eligibility, terminal classification, rate limit
//! - `retry.rs`        - Retryable failures and the backoff table
//! - `crash_safety.rs` - Bootstrap from Pending and lost-bookkeeping recovery
//! - `shutdown.rs`     - Cooperative cancellation at every suspension point
//! - `unreadable.rs`   - Settings or activation that cannot be read right now

pub(crate) mod harness;
