//! File system paths for the outreach service.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Environment variables that relocate the storage root, in priority order.
/// Hosted deployments mount a persistent disk and point one of these at it.
const STORAGE_ENV_VARS: [&str; 4] = ["STORAGE_DIR", "RENDER_DISK_PATH", "PERSIST_DIR", "PERSISTENT_DIR"];

const OUTREACH_QUEUE_FILE: &str = "outreach_queue.json";
const OUTREACH_SENT_FILE: &str = "outreach_sent.json";
const OUTREACH_DEAD_FILE: &str = "outreach_dead.json";
const SELLER_SETTINGS_FILE: &str = "seller_settings.json";

/// Manages file system paths for the service.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Resolve the storage root from the environment, else `~/.seller-assistant`.
    pub fn new() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the storage root using a custom environment lookup.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_env = STORAGE_ENV_VARS.iter().find_map(|name| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        });

        if let Some(dir) = from_env {
            return Ok(Self::with_base_dir(PathBuf::from(dir)));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;
        Ok(Self::with_base_dir(home.join(".seller-assistant")))
    }

    /// Create a Paths instance rooted at `base_dir`.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory holding the outreach collections.
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    pub fn outreach_queue_file(&self) -> PathBuf {
        self.base_dir.join(OUTREACH_QUEUE_FILE)
    }

    pub fn outreach_sent_file(&self) -> PathBuf {
        self.base_dir.join(OUTREACH_SENT_FILE)
    }

    pub fn outreach_dead_file(&self) -> PathBuf {
        self.base_dir.join(OUTREACH_DEAD_FILE)
    }

    /// Per-seller settings and chat activation allow-lists.
    pub fn seller_settings_file(&self) -> PathBuf {
        self.base_dir.join(SELLER_SETTINGS_FILE)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("outreach.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-seller");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.storage_dir(), base);
        assert_eq!(paths.outreach_queue_file(), base.join("outreach_queue.json"));
        assert_eq!(paths.outreach_sent_file(), base.join("outreach_sent.json"));
        assert_eq!(paths.outreach_dead_file(), base.join("outreach_dead.json"));
        assert_eq!(paths.seller_settings_file(), base.join("seller_settings.json"));
        assert_eq!(paths.log_file(), base.join("logs/outreach.jsonl"));
    }

    #[test]
    fn test_storage_env_priority() {
        let paths = Paths::from_lookup(|name| match name {
            "STORAGE_DIR" => Some("  ".to_string()),
            "RENDER_DISK_PATH" => Some("/var/data".to_string()),
            "PERSIST_DIR" => Some("/ignored".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(paths.base_dir(), &PathBuf::from("/var/data"));
    }

    #[test]
    fn test_defaults_to_home_dir() {
        let paths = Paths::from_lookup(|_| None).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(paths.base_dir(), &home.join(".seller-assistant"));
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("seller");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
