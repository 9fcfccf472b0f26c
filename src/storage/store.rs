//! Durable counter store
//!
//! A tiny key/value layer for the handful of `i64` counters that must
//! survive restarts. The file-backed store rewrites a JSON object through a
//! temp file + rename, so a crash leaves either the old or the new value.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Counter store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable map of named `i64` counters
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;
    fn set(&self, key: &str, value: i64) -> Result<(), StoreError>;
}

/// Counter store persisted as a JSON object on disk
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, i64>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("Opened counter store {:?} ({} keys)", path, values.len());

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, i64>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let content = serde_json::to_vec_pretty(values)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

impl CounterStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.values.lock().get(key).copied())
    }

    fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut values = self.values.lock();
        let previous = values.insert(key.to_string(), value);

        if let Err(e) = self.persist(&values) {
            // keep memory and disk in agreement
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }

        Ok(())
    }
}

/// In-memory store, used by tests and hosts without a writable data dir
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.values.lock().get(key).copied())
    }

    fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }
}

impl<S: CounterStore + ?Sized> CounterStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}
