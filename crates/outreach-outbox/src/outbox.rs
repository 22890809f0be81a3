//! Wiring of the gate and the worker around one queue.

use crate::collaborators::{ActivationTracker, MessageSender, OutreachSettings};
use crate::config::OutreachConfig;
use crate::error::OutboxResult;
use crate::gate::OutreachGate;
use crate::queue::job_queue;
use crate::worker::DeliveryWorker;
use outreach_store::OutreachStore;
use std::sync::Arc;

/// A gate and its worker, sharing one bounded queue and one store.
pub struct OutreachOutbox {
    pub gate: OutreachGate,
    pub worker: DeliveryWorker,
}

impl OutreachOutbox {
    pub fn new(
        config: OutreachConfig,
        store: Arc<OutreachStore>,
        settings: Arc<dyn OutreachSettings>,
        activation: Arc<dyn ActivationTracker>,
        sender: Arc<dyn MessageSender>,
    ) -> OutboxResult<Self> {
        config.validate()?;

        let (queue, rx) = job_queue(config.queue_capacity);
        let gate = OutreachGate::new(Arc::clone(&store), Arc::clone(&settings), queue.clone());
        let worker = DeliveryWorker::new(config, store, settings, activation, sender, queue, rx);

        Ok(Self { gate, worker })
    }

    pub fn into_parts(self) -> (OutreachGate, DeliveryWorker) {
        (self.gate, self.worker)
    }
}
