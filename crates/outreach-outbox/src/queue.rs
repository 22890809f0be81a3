//! Bounded in-memory hand-off between the gate and the worker.

use outreach_store::OutreachJob;
use tokio::sync::mpsc::{self, error::TrySendError, Permit, Receiver, Sender};

/// Producer side of the delivery queue. Never blocks.
#[derive(Clone)]
pub(crate) struct QueueHandle {
    tx: Sender<OutreachJob>,
}

pub(crate) fn job_queue(capacity: usize) -> (QueueHandle, Receiver<OutreachJob>) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueHandle { tx }, rx)
}

/// Why a slot could not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotUnavailable {
    Full,
    /// The worker has stopped and dropped its receiver.
    Closed,
}

impl QueueHandle {
    /// Jobs waiting (including reserved slots).
    pub(crate) fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Claim a slot without enqueuing anything yet. Dropping the permit frees it.
    pub(crate) fn try_reserve(&self) -> Result<Permit<'_, OutreachJob>, SlotUnavailable> {
        self.tx.try_reserve().map_err(|err| match err {
            TrySendError::Full(()) => SlotUnavailable::Full,
            TrySendError::Closed(()) => SlotUnavailable::Closed,
        })
    }

    /// Non-blocking push; hands the job back if it did not fit.
    pub(crate) fn try_push(&self, job: OutreachJob) -> Result<(), OutreachJob> {
        self.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) | TrySendError::Closed(job) => job,
        })
    }
}
