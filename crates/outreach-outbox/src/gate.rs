//! Admission of outreach jobs.

use crate::collaborators::OutreachSettings;
use crate::idempotency::NewOutreachJob;
use crate::queue::{job_queue, QueueHandle, SlotUnavailable};
use outreach_store::OutreachStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to an admission request.
///
/// Informational only: callers are free to ignore it, nothing here is an
/// error they need to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Persisted to Pending and handed to the worker.
    Queued { idempotency_key: String },
    /// Persisted to Pending while no worker is running; picked up at next start.
    Persisted { idempotency_key: String },
    OutreachDisabled,
    /// Seller settings could not be read; nothing was admitted.
    SettingsUnavailable,
    AlreadySent { idempotency_key: String },
    AlreadyPending { idempotency_key: String },
    QueueFull { idempotency_key: String },
    /// The store could not be read or written.
    StoreUnavailable { idempotency_key: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Queued { .. } | Self::Persisted { .. })
    }
}

/// Public entry point for proactive messages. Cheap to clone.
#[derive(Clone)]
pub struct OutreachGate {
    store: Arc<OutreachStore>,
    settings: Arc<dyn OutreachSettings>,
    queue: QueueHandle,
}

impl OutreachGate {
    pub(crate) fn new(
        store: Arc<OutreachStore>,
        settings: Arc<dyn OutreachSettings>,
        queue: QueueHandle,
    ) -> Self {
        Self {
            store,
            settings,
            queue,
        }
    }

    /// Gate with no worker behind it: admitted jobs only land in Pending and
    /// are delivered by whichever process starts a worker on this store next.
    pub fn offline(store: Arc<OutreachStore>, settings: Arc<dyn OutreachSettings>) -> Self {
        let (queue, rx) = job_queue(1);
        drop(rx);
        Self::new(store, settings, queue)
    }

    /// Admit one proactive message. Never blocks on the worker and never fails.
    pub fn enqueue(&self, request: NewOutreachJob) -> Admission {
        match self.settings.is_outreach_enabled(request.user_id) {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    user_id = request.user_id,
                    chat_id = %request.chat_id,
                    "Outreach disabled, job not admitted"
                );
                return Admission::OutreachDisabled;
            }
            Err(err) => {
                error!(
                    user_id = request.user_id,
                    chat_id = %request.chat_id,
                    error = %err,
                    "Seller settings unreadable, job dropped"
                );
                return Admission::SettingsUnavailable;
            }
        }

        let job = request.into_job();
        let key = job.idempotency_key.clone();

        match self.store.is_sent(&key) {
            Ok(true) => {
                info!(idempotency_key = %key, chat_id = %job.chat_id, "Already delivered, job not admitted");
                return Admission::AlreadySent { idempotency_key: key };
            }
            Ok(false) => {}
            Err(err) => {
                error!(idempotency_key = %key, error = %err, "Sent-record unreadable, job dropped");
                return Admission::StoreUnavailable { idempotency_key: key };
            }
        }

        match self.store.is_pending(&key) {
            Ok(true) => {
                debug!(idempotency_key = %key, chat_id = %job.chat_id, "Already pending, duplicate ignored");
                return Admission::AlreadyPending { idempotency_key: key };
            }
            Ok(false) => {}
            Err(err) => {
                error!(idempotency_key = %key, error = %err, "Pending unreadable, job dropped");
                return Admission::StoreUnavailable { idempotency_key: key };
            }
        }

        // Slot first, then disk, then hand-off: the worker can never dequeue a
        // job that is not yet in Pending.
        let permit = match self.queue.try_reserve() {
            Ok(permit) => Some(permit),
            Err(SlotUnavailable::Full) => {
                warn!(
                    idempotency_key = %key,
                    chat_id = %job.chat_id,
                    capacity = self.queue.capacity(),
                    "Outreach queue full, job dropped"
                );
                return Admission::QueueFull { idempotency_key: key };
            }
            Err(SlotUnavailable::Closed) => None,
        };

        if let Err(err) = self.store.upsert_pending(&job) {
            error!(idempotency_key = %key, error = %err, "Failed to persist outreach job, dropped");
            return Admission::StoreUnavailable { idempotency_key: key };
        }

        match permit {
            Some(permit) => {
                let chat_id = job.chat_id.clone();
                permit.send(job);
                info!(
                    idempotency_key = %key,
                    chat_id = %chat_id,
                    queue_len = self.queue.len(),
                    "Outreach job enqueued"
                );
                Admission::Queued { idempotency_key: key }
            }
            None => {
                info!(
                    idempotency_key = %key,
                    chat_id = %job.chat_id,
                    "Worker not running, job persisted for next start"
                );
                Admission::Persisted { idempotency_key: key }
            }
        }
    }

    /// Jobs currently waiting in memory.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }
}
