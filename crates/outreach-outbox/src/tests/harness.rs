//! Test harness for outreach outbox integration tests.
//!
//! Provides:
//! - StaticSettings / StaticActivation: in-memory collaborators that can be
//!   made unreadable
//! - MockSender: scripted send primitive that records every call
//! - TestHarness: a temp-dir store plus helpers to build and run outboxes

use crate::{
    ActivationTracker, MessageSender, OutreachConfig, OutreachGate, OutreachOutbox,
    OutreachSettings, SendOutcome, SourceUnavailable,
};
use async_trait::async_trait;
use outreach_store::{OutreachJob, OutreachStore};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const USER: i64 = 1;

/// Outreach enabled for everyone unless disabled, fixed pacing.
pub struct StaticSettings {
    disabled: Mutex<HashSet<i64>>,
    unreadable: Mutex<bool>,
    pacing_secs: u64,
}

impl StaticSettings {
    pub fn new(pacing_secs: u64) -> Self {
        Self {
            disabled: Mutex::new(HashSet::new()),
            unreadable: Mutex::new(false),
            pacing_secs,
        }
    }

    pub fn disable(&self, user_id: i64) {
        self.disabled.lock().insert(user_id);
    }

    /// Simulate a settings source that cannot be read, e.g. mid-rewrite.
    pub fn set_unreadable(&self, unreadable: bool) {
        *self.unreadable.lock() = unreadable;
    }
}

impl OutreachSettings for StaticSettings {
    fn is_outreach_enabled(&self, user_id: i64) -> Result<bool, SourceUnavailable> {
        if *self.unreadable.lock() {
            return Err(SourceUnavailable::new("seller settings", "truncated file"));
        }
        Ok(!self.disabled.lock().contains(&user_id))
    }

    fn pacing_interval_secs(&self, _user_id: i64) -> u64 {
        self.pacing_secs
    }
}

#[derive(Default)]
pub struct StaticActivation {
    chats: Mutex<HashMap<i64, HashSet<String>>>,
    unreadable: Mutex<bool>,
}

impl StaticActivation {
    pub fn activate(&self, user_id: i64, chat_id: &str) {
        self.chats
            .lock()
            .entry(user_id)
            .or_default()
            .insert(chat_id.to_string());
    }

    pub fn set_unreadable(&self, unreadable: bool) {
        *self.unreadable.lock() = unreadable;
    }
}

impl ActivationTracker for StaticActivation {
    fn activated_chat_ids(&self, user_id: i64) -> Result<HashSet<String>, SourceUnavailable> {
        if *self.unreadable.lock() {
            return Err(SourceUnavailable::new("chat activation", "truncated file"));
        }
        Ok(self.chats.lock().get(&user_id).cloned().unwrap_or_default())
    }
}

/// One invocation of the send primitive.
#[derive(Debug, Clone)]
pub struct SentCall {
    pub chat_id: String,
    pub text: String,
    pub idempotency_key: String,
    pub at: Instant,
}

/// Send primitive returning scripted outcomes, then a default.
pub struct MockSender {
    script: Mutex<VecDeque<SendOutcome>>,
    default_outcome: Mutex<SendOutcome>,
    calls: Mutex<Vec<SentCall>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(SendOutcome::delivered(200)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Outcome for the next call not covered by the script.
    pub fn set_default(&self, outcome: SendOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.script.lock().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<SentCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl MessageSender for MockSender {
    async fn send(&self, chat_id: &str, text: &str, idempotency_key: &str) -> SendOutcome {
        self.calls.lock().push(SentCall {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            idempotency_key: idempotency_key.to_string(),
            at: Instant::now(),
        });
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default_outcome.lock().clone())
    }
}

/// Store in a temp dir plus mock collaborators.
pub struct TestHarness {
    pub store: Arc<OutreachStore>,
    pub settings: Arc<StaticSettings>,
    pub activation: Arc<StaticActivation>,
    pub sender: Arc<MockSender>,
    pub config: OutreachConfig,
    dir: TempDir,
}

/// A worker spawned on the test runtime.
pub struct RunningWorker {
    pub gate: OutreachGate,
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl RunningWorker {
    /// Cancel and wait for the loop to exit.
    pub async fn stop(self) {
        self.token.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(OutreachConfig::default())
    }

    pub fn with_config(config: OutreachConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(OutreachStore::open(dir.path()));
        let activation = Arc::new(StaticActivation::default());
        activation.activate(USER, "c1");

        Self {
            store,
            settings: Arc::new(StaticSettings::new(1)),
            activation,
            sender: Arc::new(MockSender::new()),
            config,
            dir,
        }
    }

    /// Fresh gate and worker over the shared store, as after a restart.
    pub fn outbox(&self) -> OutreachOutbox {
        OutreachOutbox::new(
            self.config.clone(),
            Arc::clone(&self.store),
            self.settings.clone(),
            self.activation.clone(),
            self.sender.clone(),
        )
        .unwrap()
    }

    /// A second store instance over the same files.
    pub fn reopen_store(&self) -> OutreachStore {
        OutreachStore::open(self.dir.path())
    }

    pub fn start(&self) -> RunningWorker {
        let (gate, worker) = self.outbox().into_parts();
        let token = worker.cancellation_token();
        let handle = tokio::spawn(worker.run());
        RunningWorker {
            gate,
            token,
            handle,
        }
    }

    pub fn pending(&self, key: &str) -> Option<OutreachJob> {
        self.store.get_pending(key).unwrap()
    }
}

/// Poll `condition` on virtual time until it holds or `limit` passes.
pub async fn wait_until<F>(limit: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
