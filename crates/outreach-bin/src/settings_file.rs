//! Seller settings and chat activation backed by `seller_settings.json`.
//!
//! The file is re-read on every lookup so edits made by the rest of the
//! assistant are picked up by a running worker.

use anyhow::Context;
use outreach_outbox::{ActivationTracker, OutreachSettings, SourceUnavailable};
use outreach_store::atomic_write;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Pacing used for sellers who never chose one.
pub const DEFAULT_PACING_SECS: u64 = 30;

fn default_pacing_secs() -> u64 {
    DEFAULT_PACING_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerSettings {
    #[serde(default)]
    pub outreach_enabled: bool,
    #[serde(default = "default_pacing_secs")]
    pub outreach_interval_secs: u64,
    #[serde(default)]
    pub activated_chat_ids: BTreeSet<String>,
}

impl Default for SellerSettings {
    fn default() -> Self {
        Self {
            outreach_enabled: false,
            outreach_interval_secs: DEFAULT_PACING_SECS,
            activated_chat_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    users: BTreeMap<String, SellerSettings>,
}

pub struct SettingsFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsFile {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings for one seller; unknown sellers get the defaults. An
    /// unreadable file is an error, not a seller with outreach off.
    pub fn seller(&self, user_id: i64) -> anyhow::Result<SellerSettings> {
        let _guard = self.lock.lock();
        let mut doc = self.read()?;
        Ok(doc.users.remove(&user_id.to_string()).unwrap_or_default())
    }

    /// Read-modify-write one seller's settings. The file is replaced
    /// atomically, so a concurrent reader sees either version in full.
    pub fn update<F>(&self, user_id: i64, change: F) -> anyhow::Result<SellerSettings>
    where
        F: FnOnce(&mut SellerSettings),
    {
        let _guard = self.lock.lock();
        let mut doc = self.read()?;
        let entry = doc.users.entry(user_id.to_string()).or_default();
        change(entry);
        let updated = entry.clone();

        let content = serde_json::to_string_pretty(&doc)?;
        atomic_write(&self.path, content.as_bytes())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(updated)
    }

    fn read(&self) -> anyhow::Result<SettingsDocument> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(SettingsDocument::default()),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", self.path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SettingsDocument::default()),
            Err(err) => Err(err).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn unavailable(what: &'static str, err: anyhow::Error) -> SourceUnavailable {
        SourceUnavailable::new(what, format!("{err:#}"))
    }
}

impl OutreachSettings for SettingsFile {
    fn is_outreach_enabled(&self, user_id: i64) -> Result<bool, SourceUnavailable> {
        self.seller(user_id)
            .map(|seller| seller.outreach_enabled)
            .map_err(|err| Self::unavailable("seller settings", err))
    }

    fn pacing_interval_secs(&self, user_id: i64) -> u64 {
        match self.seller(user_id) {
            Ok(seller) => seller.outreach_interval_secs,
            Err(err) => {
                warn!(path = %self.path.display(), error = %format!("{err:#}"), "Seller settings unreadable, default pacing");
                DEFAULT_PACING_SECS
            }
        }
    }
}

impl ActivationTracker for SettingsFile {
    fn activated_chat_ids(&self, user_id: i64) -> Result<HashSet<String>, SourceUnavailable> {
        self.seller(user_id)
            .map(|seller| seller.activated_chat_ids.into_iter().collect())
            .map_err(|err| Self::unavailable("chat activation", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unknown_seller_is_disabled_with_default_pacing() {
        let dir = tempdir().unwrap();
        let settings = SettingsFile::open(dir.path().join("seller_settings.json"));

        assert_eq!(settings.is_outreach_enabled(42), Ok(false));
        assert_eq!(settings.pacing_interval_secs(42), DEFAULT_PACING_SECS);
        assert!(settings.activated_chat_ids(42).unwrap().is_empty());
    }

    #[test]
    fn test_update_persists_per_seller() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seller_settings.json");
        let settings = SettingsFile::open(&path);

        settings
            .update(42, |seller| {
                seller.outreach_enabled = true;
                seller.outreach_interval_secs = 5;
                seller.activated_chat_ids.insert("c1".to_string());
            })
            .unwrap();

        let reopened = SettingsFile::open(&path);
        assert_eq!(reopened.is_outreach_enabled(42), Ok(true));
        assert_eq!(reopened.pacing_interval_secs(42), 5);
        assert!(reopened.activated_chat_ids(42).unwrap().contains("c1"));
        assert_eq!(reopened.is_outreach_enabled(7), Ok(false));
    }

    #[test]
    fn test_hand_written_file_with_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seller_settings.json");
        std::fs::write(&path, r#"{"users": {"42": {"outreach_enabled": true}}}"#).unwrap();

        let settings = SettingsFile::open(&path);
        assert_eq!(settings.is_outreach_enabled(42), Ok(true));
        assert_eq!(settings.pacing_interval_secs(42), DEFAULT_PACING_SECS);
    }

    #[test]
    fn test_unreadable_file_is_unavailable_not_disabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seller_settings.json");
        let full = r#"{"users": {"42": {"outreach_enabled": true, "activated_chat_ids": ["c1"]}}}"#;
        // Half of a valid document.
        std::fs::write(&path, &full[..full.len() / 2]).unwrap();

        let settings = SettingsFile::open(&path);
        let err = settings.is_outreach_enabled(42).unwrap_err();
        assert_eq!(err.what, "seller settings");
        assert!(settings.activated_chat_ids(42).is_err());
        assert_eq!(settings.pacing_interval_secs(42), DEFAULT_PACING_SECS);
        assert!(settings.update(42, |_| {}).is_err());

        std::fs::write(&path, full).unwrap();
        assert_eq!(settings.is_outreach_enabled(42), Ok(true));
    }

    #[test]
    fn test_update_replaces_file_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seller_settings.json");
        let settings = SettingsFile::open(&path);

        for secs in 1..=3 {
            settings
                .update(42, |seller| {
                    seller.outreach_enabled = true;
                    seller.outreach_interval_secs = secs;
                })
                .unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["seller_settings.json".to_string()]);
        assert_eq!(settings.pacing_interval_secs(42), 3);
    }

    #[test]
    fn test_readers_never_see_a_partial_file_during_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seller_settings.json");
        let writer = SettingsFile::open(&path);
        writer
            .update(42, |seller| {
                seller.outreach_enabled = true;
                seller.activated_chat_ids.insert("c1".to_string());
            })
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..200 {
                    writer
                        .update(42, |seller| {
                            seller.activated_chat_ids.insert(format!("extra-{i}"));
                        })
                        .unwrap();
                }
            });
            scope.spawn(|| {
                // Separate handle: no shared in-process mutex with the writer.
                let reader = SettingsFile::open(&path);
                for _ in 0..200 {
                    assert_eq!(reader.is_outreach_enabled(42), Ok(true));
                    assert!(reader.activated_chat_ids(42).unwrap().contains("c1"));
                }
            });
        });
    }
}
