//! Single cooperative delivery loop.
//!
//! One worker per process drains the in-memory queue, enforces the global
//! minimum send interval, calls the send primitive, classifies failures and
//! drives retry or dead-lettering. Every state transition reaches the durable
//! store before the next step runs, so the process can die at any point and
//! the next start resumes from Pending.

use crate::classify::{classify_failure, is_retryable};
use crate::collaborators::{ActivationTracker, MessageSender, OutreachSettings};
use crate::config::OutreachConfig;
use crate::error::{OutboxResult, SourceUnavailable};
use crate::queue::QueueHandle;
use outreach_store::{JobStatus, OutreachJob, OutreachStore, ReasonCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const ALREADY_DELIVERED: &str = "already delivered";

/// How one dequeued job ended for this pass of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Sent, failed terminally, or short-circuited. Pacing applies.
    Finished { user_id: i64 },
    /// Back in the queue after a wait; still in Pending.
    Requeued,
    /// No longer in Pending; nothing to do.
    Stale,
    /// Stop signal observed mid-job; the job stays in Pending.
    Abandoned,
}

/// Drains the outreach queue until cancelled.
pub struct DeliveryWorker {
    config: OutreachConfig,
    store: Arc<OutreachStore>,
    settings: Arc<dyn OutreachSettings>,
    activation: Arc<dyn ActivationTracker>,
    sender: Arc<dyn MessageSender>,
    queue: QueueHandle,
    rx: Receiver<OutreachJob>,
    cancellation_token: CancellationToken,
    /// Completion time of the last successful send, for the global floor.
    last_send_at: Option<Instant>,
    bootstrapped: bool,
}

impl DeliveryWorker {
    pub(crate) fn new(
        config: OutreachConfig,
        store: Arc<OutreachStore>,
        settings: Arc<dyn OutreachSettings>,
        activation: Arc<dyn ActivationTracker>,
        sender: Arc<dyn MessageSender>,
        queue: QueueHandle,
        rx: Receiver<OutreachJob>,
    ) -> Self {
        Self {
            config,
            store,
            settings,
            activation,
            sender,
            queue,
            rx,
            cancellation_token: CancellationToken::new(),
            last_send_at: None,
            bootstrapped: false,
        }
    }

    /// Token that stops this worker. Clone it before calling [`run`](Self::run).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Reload Pending into the in-memory queue, oldest first.
    ///
    /// Jobs caught mid-send by a crash are reset to `queued`. Stops at the
    /// first job that does not fit; the rest stay in Pending for a later start.
    /// Returns the number of jobs restored.
    pub fn bootstrap(&mut self) -> OutboxResult<usize> {
        self.bootstrapped = true;
        let jobs = self.store.load_pending()?;
        let total = jobs.len();
        let mut restored = 0;

        for mut job in jobs {
            if job.status == JobStatus::Sending {
                job.transition(JobStatus::Queued);
                self.store.upsert_pending(&job)?;
            }
            if let Err(job) = self.queue.try_push(job) {
                warn!(
                    idempotency_key = %job.idempotency_key,
                    restored,
                    remaining = total - restored,
                    "Queue full during bootstrap, rest left in Pending"
                );
                break;
            }
            restored += 1;
        }

        info!(restored, pending = total, "Outreach queue bootstrapped");
        Ok(restored)
    }

    /// Run until the cancellation token fires.
    ///
    /// Bootstraps first unless [`bootstrap`](Self::bootstrap) was already
    /// called. On stop, whatever is still queued in memory is discarded; it
    /// remains in Pending.
    pub async fn run(mut self) {
        info!(
            capacity = self.queue.capacity(),
            min_send_interval_ms = self.config.min_send_interval.as_millis() as u64,
            "Outreach delivery worker started"
        );

        if !self.bootstrapped {
            if let Err(err) = self.bootstrap() {
                error!(error = %err, "Outreach bootstrap failed, continuing with live admissions only");
            }
        }

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => break,
                next = timeout(self.config.dequeue_timeout, self.rx.recv()) => next,
            };

            let job = match next {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => continue,
            };

            if self.cancellation_token.is_cancelled() {
                debug!(idempotency_key = %job.idempotency_key, "Stop requested, job left in Pending");
                break;
            }

            let key = job.idempotency_key.clone();
            match self.process(job).await {
                Ok(Step::Finished { user_id }) => {
                    if !self.pace(user_id).await {
                        break;
                    }
                }
                Ok(Step::Requeued) | Ok(Step::Stale) => {}
                Ok(Step::Abandoned) => break,
                Err(err) => {
                    error!(idempotency_key = %key, error = %err, "Outreach store error, job left in Pending");
                }
            }
        }

        let discarded = self.drain();
        info!(discarded, "Outreach delivery worker stopped");
    }

    async fn process(&mut self, queued: OutreachJob) -> OutboxResult<Step> {
        let key = queued.idempotency_key;

        // Pending holds the authoritative snapshot; the queued copy may be stale.
        let Some(mut job) = self.store.get_pending(&key)? else {
            debug!(idempotency_key = %key, "Job no longer pending, skipped");
            return Ok(Step::Stale);
        };

        job.transition(JobStatus::Sending);
        self.store.upsert_pending(&job)?;

        match self.settings.is_outreach_enabled(job.user_id) {
            Ok(true) => {}
            Ok(false) => {
                job.record_failure(ReasonCode::Auth, Some("outreach disabled".to_string()), None);
                return self.fail(job);
            }
            Err(err) => return self.defer(job, err).await,
        }

        if self.store.is_sent(&key)? {
            job.reason_code = None;
            job.last_error = Some(ALREADY_DELIVERED.to_string());
            job.transition(JobStatus::Failed);
            self.store.remove_pending(&key)?;
            info!(idempotency_key = %key, chat_id = %job.chat_id, "Already delivered, skipped");
            return Ok(Step::Finished { user_id: job.user_id });
        }

        let activated = match self.activation.activated_chat_ids(job.user_id) {
            Ok(chats) => chats,
            Err(err) => return self.defer(job, err).await,
        };
        if !activated.contains(&job.chat_id) {
            job.record_failure(
                ReasonCode::NotActiveChat,
                Some("chat not activated by buyer".to_string()),
                None,
            );
            return self.fail(job);
        }

        if !self.wait_for_send_slot().await {
            job.transition(JobStatus::Queued);
            self.store.upsert_pending(&job)?;
            debug!(idempotency_key = %key, "Stop requested before send, job requeued in Pending");
            return Ok(Step::Abandoned);
        }

        let attempt = job.begin_attempt();
        self.store.upsert_pending(&job)?;

        debug!(idempotency_key = %key, chat_id = %job.chat_id, attempt, "Sending outreach message");
        let outcome = self.sender.send(&job.chat_id, &job.text, &key).await;

        if outcome.ok {
            job.mark_sent(outcome.status);
            self.store.mark_sent(&key)?;
            self.store.remove_pending(&key)?;
            self.last_send_at = Some(Instant::now());
            info!(
                idempotency_key = %key,
                user_id = job.user_id,
                chat_id = %job.chat_id,
                attempt,
                "Outreach message delivered"
            );
            return Ok(Step::Finished { user_id: job.user_id });
        }

        let reason = classify_failure(outcome.status, outcome.error.as_deref());
        job.record_failure(reason, outcome.error, outcome.status);

        if is_retryable(outcome.status) && attempt < self.config.max_attempts {
            job.transition(JobStatus::Queued);
            self.store.upsert_pending(&job)?;

            let delay = self.config.backoff_for(attempt);
            warn!(
                idempotency_key = %key,
                chat_id = %job.chat_id,
                attempt,
                reason = %reason,
                status = ?job.last_status,
                delay_secs = delay.as_secs(),
                "Outreach send failed, retrying after backoff"
            );

            if !self.sleep_or_cancel(delay).await {
                debug!(idempotency_key = %key, "Stop requested during backoff, job left in Pending");
                return Ok(Step::Abandoned);
            }

            if let Err(job) = self.queue.try_push(job) {
                warn!(
                    idempotency_key = %job.idempotency_key,
                    "Queue full on requeue, job left in Pending for next start"
                );
            }
            return Ok(Step::Requeued);
        }

        self.fail(job)
    }

    /// Put the job back to `queued` and retry the checks after
    /// `recheck_delay`, without spending an attempt.
    async fn defer(&self, mut job: OutreachJob, cause: SourceUnavailable) -> OutboxResult<Step> {
        job.transition(JobStatus::Queued);
        self.store.upsert_pending(&job)?;

        let delay = self.config.recheck_delay;
        warn!(
            idempotency_key = %job.idempotency_key,
            user_id = job.user_id,
            error = %cause,
            delay_secs = delay.as_secs(),
            "Eligibility unknown, job deferred"
        );

        if !self.sleep_or_cancel(delay).await {
            return Ok(Step::Abandoned);
        }
        if let Err(job) = self.queue.try_push(job) {
            warn!(
                idempotency_key = %job.idempotency_key,
                "Queue full on requeue, job left in Pending for next start"
            );
        }
        Ok(Step::Requeued)
    }

    /// Terminal failure: dead-letter first, then drop from Pending.
    fn fail(&self, mut job: OutreachJob) -> OutboxResult<Step> {
        job.transition(JobStatus::Failed);
        self.store.append_dead_letter(&job.to_dead_letter())?;
        self.store.remove_pending(&job.idempotency_key)?;

        error!(
            idempotency_key = %job.idempotency_key,
            user_id = job.user_id,
            chat_id = %job.chat_id,
            attempts = job.attempts,
            reason = %job.reason_code.unwrap_or(ReasonCode::Unknown),
            status = ?job.last_status,
            error = job.last_error.as_deref().unwrap_or(""),
            "Outreach job failed, dead-lettered"
        );
        Ok(Step::Finished { user_id: job.user_id })
    }

    /// Hold until the global minimum interval since the last successful send
    /// has passed. Returns false if stopped while waiting.
    async fn wait_for_send_slot(&self) -> bool {
        let Some(last) = self.last_send_at else {
            return true;
        };
        let ready_at = last + self.config.min_send_interval;
        let now = Instant::now();
        if now >= ready_at {
            return true;
        }
        debug!(wait_ms = (ready_at - now).as_millis() as u64, "Rate limit, waiting before send");
        self.sleep_or_cancel(ready_at - now).await
    }

    /// Per-user throughput pacing after a finished job, at least one second.
    async fn pace(&self, user_id: i64) -> bool {
        let secs = self.settings.pacing_interval_secs(user_id).max(1);
        self.sleep_or_cancel(Duration::from_secs(secs)).await
    }

    /// Returns false if the stop signal fired first.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn drain(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Empty the in-memory queue without processing, for inspection in tests.
    #[cfg(test)]
    pub(crate) fn take_queued(&mut self) -> Vec<OutreachJob> {
        let mut jobs = Vec::new();
        while let Ok(job) = self.rx.try_recv() {
            jobs.push(job);
        }
        jobs
    }
}
