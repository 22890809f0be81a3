//! The three durable outreach collections behind one lock.

use crate::atomic::{read_entries, read_keyed_entries, write_entries};
use crate::error::{StoreError, StoreResult};
use crate::lock::FileLock;
use crate::models::{DeadLetterEntry, OutreachJob};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How long a delivered idempotency key is remembered by default.
pub const DEFAULT_SENT_RETENTION_DAYS: u32 = 30;

const PENDING_FILE: &str = "outreach_queue.json";
const SENT_FILE: &str = "outreach_sent.json";
const DEAD_LETTER_FILE: &str = "outreach_dead.json";
const STORE_LOCK_FILE: &str = ".outreach.lock";
const DELIVERY_LOCK_FILE: &str = "outreach_worker.lock";

type PendingEntries = BTreeMap<String, OutreachJob>;
type SentEntries = BTreeMap<String, DateTime<Utc>>;
type DeadLetterEntries = Vec<DeadLetterEntry>;

/// File locations of the three collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFiles {
    pub pending: PathBuf,
    pub sent: PathBuf,
    pub dead_letter: PathBuf,
}

impl StoreFiles {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            pending: dir.join(PENDING_FILE),
            sent: dir.join(SENT_FILE),
            dead_letter: dir.join(DEAD_LETTER_FILE),
        }
    }

    /// Lock file serializing every read-modify-write, across processes.
    pub fn store_lock(&self) -> PathBuf {
        self.pending.with_file_name(STORE_LOCK_FILE)
    }

    /// Lock file held by the one process allowed to deliver from this store.
    pub fn delivery_lock(&self) -> PathBuf {
        self.pending.with_file_name(DELIVERY_LOCK_FILE)
    }
}

/// Exclusive right to deliver from a store, released on drop.
pub struct DeliveryClaim {
    _lock: FileLock,
}

/// Both locks of one store operation. Field order is release order.
struct StoreGuard<'a> {
    _process: FileLock,
    _thread: MutexGuard<'a, ()>,
}

/// Durable Pending / Sent-record / Dead-letter store.
///
/// Every operation goes to disk with no cache, under an in-process mutex and an
/// advisory lock on [`StoreFiles::store_lock`]. Any number of instances, in any
/// number of processes, may share one set of files without losing updates.
/// Delivery itself is single-process; see [`OutreachStore::claim_delivery`].
pub struct OutreachStore {
    files: StoreFiles,
    retention: Duration,
    lock: Mutex<()>,
}

impl OutreachStore {
    pub fn new(files: StoreFiles) -> Self {
        Self {
            files,
            retention: Duration::days(i64::from(DEFAULT_SENT_RETENTION_DAYS)),
            lock: Mutex::new(()),
        }
    }

    /// Store rooted at `dir` with the standard file names.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self::new(StoreFiles::in_dir(dir))
    }

    /// Override how long sent-records are kept. Zero is clamped to one day.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention = Duration::days(i64::from(days.max(1)));
        self
    }

    pub fn files(&self) -> &StoreFiles {
        &self.files
    }

    /// Claim delivery for the caller. Fails with [`StoreError::Busy`] while
    /// another claim is live, in this process or any other.
    pub fn claim_delivery(&self) -> StoreResult<DeliveryClaim> {
        let path = self.files.delivery_lock();
        match FileLock::try_exclusive(&path)? {
            Some(lock) => Ok(DeliveryClaim { _lock: lock }),
            None => Err(StoreError::Busy { path }),
        }
    }

    fn guard(&self) -> StoreResult<StoreGuard<'_>> {
        let thread = self.lock.lock();
        let process = FileLock::exclusive(&self.files.store_lock())?;
        Ok(StoreGuard {
            _process: process,
            _thread: thread,
        })
    }

    // ========================================================================
    // Pending
    // ========================================================================

    /// All pending jobs, oldest first.
    pub fn load_pending(&self) -> StoreResult<Vec<OutreachJob>> {
        let _guard = self.guard()?;
        let pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        let mut jobs: Vec<OutreachJob> = pending.into_values().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    pub fn is_pending(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.guard()?;
        let pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        Ok(pending.contains_key(key))
    }

    /// Current snapshot of one pending job.
    pub fn get_pending(&self, key: &str) -> StoreResult<Option<OutreachJob>> {
        let _guard = self.guard()?;
        let mut pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        Ok(pending.remove(key))
    }

    /// Insert or replace the snapshot stored under the job's idempotency key.
    pub fn upsert_pending(&self, job: &OutreachJob) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        pending.insert(job.idempotency_key.clone(), job.clone());
        write_entries(&self.files.pending, &pending)?;
        debug!(
            idempotency_key = %job.idempotency_key,
            status = %job.status,
            attempts = job.attempts,
            "Pending snapshot written"
        );
        Ok(())
    }

    /// Remove a pending job. Returns whether it was present.
    pub fn remove_pending(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.guard()?;
        let mut pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        if pending.remove(key).is_none() {
            return Ok(false);
        }
        write_entries(&self.files.pending, &pending)?;
        Ok(true)
    }

    pub fn pending_count(&self) -> StoreResult<usize> {
        let _guard = self.guard()?;
        let pending: PendingEntries = read_keyed_entries(&self.files.pending)?;
        Ok(pending.len())
    }

    // ========================================================================
    // Sent-record
    // ========================================================================

    /// Whether `key` has been delivered within the retention window.
    pub fn is_sent(&self, key: &str) -> StoreResult<bool> {
        Ok(self.sent_expiry(key)?.is_some())
    }

    /// Expiry of the live sent-record for `key`, if any.
    pub fn sent_expiry(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let _guard = self.guard()?;
        let sent = self.read_live_sent(Utc::now())?;
        Ok(sent.get(key).copied())
    }

    /// Record `key` as delivered now.
    pub fn mark_sent(&self, key: &str) -> StoreResult<()> {
        self.mark_sent_at(key, Utc::now())
    }

    pub(crate) fn mark_sent_at(&self, key: &str, sent_at: DateTime<Utc>) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut sent = self.read_live_sent(Utc::now())?;
        let expires_at = sent_at + self.retention;
        sent.insert(key.to_string(), expires_at);
        write_entries(&self.files.sent, &sent)?;
        debug!(idempotency_key = %key, expires_at = %expires_at.to_rfc3339(), "Sent-record written");
        Ok(())
    }

    /// Number of live sent-records.
    pub fn sent_count(&self) -> StoreResult<usize> {
        let _guard = self.guard()?;
        Ok(self.read_live_sent(Utc::now())?.len())
    }

    /// Read the sent-record, dropping entries whose expiry has passed and
    /// persisting the purge if anything went. Caller holds the lock.
    fn read_live_sent(&self, now: DateTime<Utc>) -> StoreResult<SentEntries> {
        let mut sent: SentEntries = read_keyed_entries(&self.files.sent)?;
        let before = sent.len();
        sent.retain(|_, expires_at| *expires_at > now);

        let purged = before - sent.len();
        if purged > 0 {
            write_entries(&self.files.sent, &sent)?;
            info!(purged, remaining = sent.len(), "Expired sent-records purged");
        }
        Ok(sent)
    }

    // ========================================================================
    // Dead-letter
    // ========================================================================

    pub fn append_dead_letter(&self, entry: &DeadLetterEntry) -> StoreResult<()> {
        let _guard = self.guard()?;
        let mut dead: DeadLetterEntries = read_entries(&self.files.dead_letter)?;
        dead.push(entry.clone());
        write_entries(&self.files.dead_letter, &dead)?;
        Ok(())
    }

    /// Every dead-letter entry, in the order written.
    pub fn dead_letters(&self) -> StoreResult<Vec<DeadLetterEntry>> {
        let _guard = self.guard()?;
        read_entries(&self.files.dead_letter)
    }

    /// The newest `limit` dead-letter entries, oldest of those first.
    pub fn recent_dead_letters(&self, limit: usize) -> StoreResult<Vec<DeadLetterEntry>> {
        let mut dead = self.dead_letters()?;
        let skip = dead.len().saturating_sub(limit);
        Ok(dead.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, ReasonCode};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn job(key: &str, created_at: DateTime<Utc>) -> OutreachJob {
        OutreachJob::new(
            key.to_string(),
            1,
            format!("chat-{key}"),
            "hello".to_string(),
            created_at,
        )
    }

    #[test]
    fn test_store_files_in_dir() {
        let files = StoreFiles::in_dir("/data");
        assert_eq!(files.pending, PathBuf::from("/data/outreach_queue.json"));
        assert_eq!(files.sent, PathBuf::from("/data/outreach_sent.json"));
        assert_eq!(files.dead_letter, PathBuf::from("/data/outreach_dead.json"));
    }

    #[test]
    fn test_empty_store() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());

        assert!(store.load_pending().unwrap().is_empty());
        assert_eq!(store.pending_count().unwrap(), 0);
        assert!(!store.is_sent("k").unwrap());
        assert_eq!(store.sent_count().unwrap(), 0);
        assert!(store.dead_letters().unwrap().is_empty());
        assert!(!dir.path().join(PENDING_FILE).exists());
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());

        let mut snapshot = job("k1", Utc::now());
        store.upsert_pending(&snapshot).unwrap();
        snapshot.transition(JobStatus::Sending);
        snapshot.begin_attempt();
        store.upsert_pending(&snapshot).unwrap();

        assert_eq!(store.pending_count().unwrap(), 1);
        let stored = store.get_pending("k1").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Sending);
        assert_eq!(stored.attempts, 1);
    }

    #[test]
    fn test_load_pending_orders_by_creation() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());
        let base = Utc::now();

        store.upsert_pending(&job("a-late", base + Duration::seconds(20))).unwrap();
        store.upsert_pending(&job("z-early", base)).unwrap();
        store.upsert_pending(&job("m-mid", base + Duration::seconds(10))).unwrap();

        let keys: Vec<String> = store
            .load_pending()
            .unwrap()
            .into_iter()
            .map(|job| job.idempotency_key)
            .collect();
        assert_eq!(keys, vec!["z-early", "m-mid", "a-late"]);
    }

    #[test]
    fn test_remove_pending() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());

        store.upsert_pending(&job("k1", Utc::now())).unwrap();
        assert!(store.is_pending("k1").unwrap());
        assert!(store.remove_pending("k1").unwrap());
        assert!(!store.is_pending("k1").unwrap());
        assert!(!store.remove_pending("k1").unwrap());
    }

    #[test]
    fn test_pending_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = OutreachStore::open(dir.path());
            store.upsert_pending(&job("k1", Utc::now())).unwrap();
        }

        let reopened = OutreachStore::open(dir.path());
        let jobs = reopened.load_pending().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].idempotency_key, "k1");
    }

    #[test]
    fn test_mark_sent_sets_retention_expiry() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path()).with_retention_days(7);

        let before = Utc::now();
        store.mark_sent("k1").unwrap();
        let expiry = store.sent_expiry("k1").unwrap().unwrap();

        assert!(store.is_sent("k1").unwrap());
        assert!(expiry >= before + Duration::days(7));
        assert!(expiry <= Utc::now() + Duration::days(7));
    }

    #[test]
    fn test_expired_sent_records_are_purged_on_lookup() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());

        store.mark_sent_at("old", Utc::now() - Duration::days(31)).unwrap();
        store.mark_sent("fresh").unwrap();

        assert!(!store.is_sent("old").unwrap());
        assert!(store.is_sent("fresh").unwrap());

        let raw = fs::read_to_string(dir.path().join(SENT_FILE)).unwrap();
        assert!(!raw.contains("\"old\""));
        assert!(raw.contains("\"fresh\""));
        assert_eq!(store.sent_count().unwrap(), 1);
    }

    #[test]
    fn test_sent_file_stores_rfc3339_expiry() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());
        store.mark_sent("k1").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(SENT_FILE)).unwrap()).unwrap();
        let expiry = raw["entries"]["k1"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(expiry).is_ok());
    }

    #[test]
    fn test_dead_letters_append_in_order() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());

        for (key, reason) in [("k1", ReasonCode::Auth), ("k2", ReasonCode::OutOfWindow), ("k3", ReasonCode::Unknown)] {
            let mut failed = job(key, Utc::now());
            failed.record_failure(reason, Some("nope".to_string()), Some(400));
            failed.transition(JobStatus::Failed);
            store.append_dead_letter(&failed.to_dead_letter()).unwrap();
        }

        let all = store.dead_letters().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].idempotency_key, "k1");
        assert_eq!(all[2].reason_code, ReasonCode::Unknown);

        let recent = store.recent_dead_letters(2).unwrap();
        let keys: Vec<&str> = recent.iter().map(|entry| entry.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["k2", "k3"]);
        assert_eq!(store.recent_dead_letters(10).unwrap().len(), 3);
    }

    #[test]
    fn test_corrupt_pending_file_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PENDING_FILE), "garbage").unwrap();
        let store = OutreachStore::open(dir.path());

        assert!(store.load_pending().unwrap().is_empty());
        store.upsert_pending(&job("k1", Utc::now())).unwrap();
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_upserts_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(OutreachStore::open(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..5 {
                        store.upsert_pending(&job(&format!("k{i}-{j}"), Utc::now())).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.pending_count().unwrap(), 40);
    }

    #[cfg(unix)]
    #[test]
    fn test_separate_instances_over_one_directory_lose_no_upserts() {
        let dir = tempdir().unwrap();
        let worker_side = OutreachStore::open(dir.path());
        let cli_side = OutreachStore::open(dir.path());

        std::thread::scope(|scope| {
            for (side, store) in [("w", &worker_side), ("c", &cli_side)] {
                scope.spawn(move || {
                    for j in 0..100 {
                        store.upsert_pending(&job(&format!("{side}{j}"), Utc::now())).unwrap();
                    }
                });
            }
        });

        assert_eq!(worker_side.pending_count().unwrap(), 200);
        assert_eq!(OutreachStore::open(dir.path()).pending_count().unwrap(), 200);
    }

    #[cfg(unix)]
    #[test]
    fn test_delivery_claim_is_exclusive_across_instances() {
        let dir = tempdir().unwrap();
        let first = OutreachStore::open(dir.path());
        let second = OutreachStore::open(dir.path());

        let claim = first.claim_delivery().unwrap();
        assert!(matches!(second.claim_delivery(), Err(StoreError::Busy { .. })));
        // Store operations are not blocked by the claim.
        second.upsert_pending(&job("k1", Utc::now())).unwrap();

        drop(claim);
        assert!(second.claim_delivery().is_ok());
    }

    #[test]
    fn test_one_bad_pending_entry_keeps_the_others() {
        let dir = tempdir().unwrap();
        let store = OutreachStore::open(dir.path());
        store.upsert_pending(&job("good", Utc::now())).unwrap();

        let path = dir.path().join(PENDING_FILE);
        let mut raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw["entries"]["bad"] = serde_json::json!({"idempotency_key": "bad", "user_id": "not-a-number"});
        fs::write(&path, raw.to_string()).unwrap();

        let keys: Vec<String> = store
            .load_pending()
            .unwrap()
            .into_iter()
            .map(|job| job.idempotency_key)
            .collect();
        assert_eq!(keys, vec!["good"]);
        assert!(store.is_pending("good").unwrap());
    }
}
