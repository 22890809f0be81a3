//! Versioned JSON envelopes replaced atomically on disk.

use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// On-disk format version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    schema_version: u32,
    entries: &'a T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    #[serde(default)]
    schema_version: Option<u32>,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    entries: T,
}

/// Read the entries of one collection file.
///
/// A missing file reads as empty. A file from a newer schema is an error and is
/// left untouched. Anything unparseable is moved aside and read as empty.
pub(crate) fn read_entries<T>(path: &Path) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(err) => return Err(StoreError::io(path, err)),
    };

    if raw.trim().is_empty() {
        return Ok(T::default());
    }

    let header: EnvelopeHeader = match serde_json::from_str(&raw) {
        Ok(header) => header,
        Err(err) => return quarantine(path, &err.to_string()),
    };

    match header.schema_version {
        Some(found) if found > SCHEMA_VERSION => {
            return Err(StoreError::UnsupportedSchema {
                path: path.to_path_buf(),
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Some(_) => {}
        None => return quarantine(path, "missing schema_version"),
    }

    match serde_json::from_str::<EnvelopeIn<T>>(&raw) {
        Ok(envelope) => Ok(envelope.entries),
        Err(err) => quarantine(path, &err.to_string()),
    }
}

/// Read a keyed collection one entry at a time.
///
/// Entries that no longer deserialize are written to a
/// `<name>.corrupt-<unix_ms>` file of their own and dropped from the
/// collection; every other entry survives. Caller holds the store lock.
pub(crate) fn read_keyed_entries<V>(path: &Path) -> StoreResult<BTreeMap<String, V>>
where
    V: DeserializeOwned,
{
    let raw: BTreeMap<String, Value> = read_entries(path)?;
    let mut entries = BTreeMap::new();
    let mut kept = BTreeMap::new();
    let mut rejected = BTreeMap::new();

    for (key, value) in raw {
        match V::deserialize(&value) {
            Ok(entry) => {
                entries.insert(key.clone(), entry);
                kept.insert(key, value);
            }
            Err(err) => {
                error!(path = %path.display(), key = %key, error = %err, "Unreadable entry set aside");
                rejected.insert(key, value);
            }
        }
    }

    if !rejected.is_empty() {
        let target = corrupt_path(path);
        write_entries(&target, &rejected)?;
        write_entries(path, &kept)?;
        error!(
            path = %path.display(),
            moved_to = %target.display(),
            rejected = rejected.len(),
            kept = kept.len(),
            "Collection entries moved aside, rest kept"
        );
    }
    Ok(entries)
}

/// Replace `path` with a fresh envelope holding `entries`.
///
/// Temp file in the same directory, fsync, rename over the target, then a
/// best-effort fsync of the directory.
pub(crate) fn write_entries<T: Serialize>(path: &Path, entries: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(&EnvelopeOut {
        schema_version: SCHEMA_VERSION,
        entries,
    })?;
    atomic_write(path, content.as_bytes())
}

/// Replace `path` with `content` so readers see the old file or the new one,
/// never a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> StoreResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("collection");
    let tmp_path = dir.join(format!(".{}.tmp.{}", file_name, unix_nanos()));

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Ok(parent_dir) = fs::File::open(dir) {
            let _ = parent_dir.sync_all();
        }
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(path, err));
    }

    debug!(path = %path.display(), bytes = content.len(), "Collection file replaced");
    Ok(())
}

fn quarantine<T: Default>(path: &Path, reason: &str) -> StoreResult<T> {
    let target = corrupt_path(path);
    fs::rename(path, &target).map_err(|err| StoreError::io(path, err))?;
    error!(
        path = %path.display(),
        moved_to = %target.display(),
        reason = %reason,
        "Unreadable collection file moved aside, starting empty"
    );
    Ok(T::default())
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", unix_nanos() / 1_000_000));
    path.with_file_name(name)
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
