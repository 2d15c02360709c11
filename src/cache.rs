//! Local persistent key-value cache.
//!
//! Every operation is best effort: a backend that cannot read behaves as if the
//! key were absent, and a backend that cannot write logs and keeps its previous
//! state. Nothing in here returns an error to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use dashmap::DashMap;
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{EntityKind, Id};

/// Stable key names other collaborators rely on.
pub mod keys {
    use super::*;

    pub const REVIEWS: &str = "reviews";
    pub const QUESTIONS: &str = "questions";

    pub fn review_comments(review_id: Id) -> String {
        format!("review_comments_{review_id}")
    }

    pub fn migration_flag(kind: EntityKind) -> String {
        format!("{}_migrated_to_supabase", kind.as_str())
    }
}

pub trait LocalCacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Reads and parses a JSON value. Unparseable data counts as a miss.
pub fn read_json<T: DeserializeOwned>(store: &dyn LocalCacheStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("[cache] Ignoring unreadable value under '{key}': {e}");
            None
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(store: &dyn LocalCacheStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(s) => store.set(key, &s),
        Err(e) => error!("[cache] Failed to serialize value for '{key}': {e}"),
    }
}

/// Map of entries persisted as a single JSON snapshot on disk.
pub struct FileCacheStore {
    entries: RwLock<HashMap<String, String>>,
    path: PathBuf,
    quota_bytes: usize,
}

impl FileCacheStore {
    pub fn open(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        let path = path.into();
        let entries = Self::load_from(&path);
        Self { entries: RwLock::new(entries), path, quota_bytes }
    }

    fn load_from(path: &Path) -> HashMap<String, String> {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(m) => {
                    info!("[cache] Loaded snapshot '{}' ({} keys)", path.display(), m.len());
                    m
                }
                Err(e) => {
                    warn!("[cache] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    HashMap::new()
                }
            },
            Err(e) => {
                info!("[cache] No snapshot at '{}': {e}. Starting empty.", path.display());
                HashMap::new()
            }
        }
    }

    fn used_bytes(entries: &HashMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Writes the snapshot to disk. False when it did not land.
    fn persist(&self, entries: &HashMap<String, String>) -> bool {
        let bytes = match serde_json::to_vec(entries) {
            Ok(b) => b,
            Err(e) => {
                error!("[cache] Failed to encode snapshot: {e}");
                return false;
            }
        };
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!("[cache] Failed to create cache directory '{}': {e}", dir.display());
                return false;
            }
        }
        match std::fs::write(&self.path, bytes) {
            Ok(()) => true,
            Err(e) => {
                error!("[cache] Failed to write snapshot '{}': {e}", self.path.display());
                false
            }
        }
    }
}

impl LocalCacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.read() {
            Ok(m) => m.get(key).cloned(),
            Err(_) => {
                error!("[cache] Store lock poisoned; treating '{key}' as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        let Ok(mut m) = self.entries.write() else {
            error!("[cache] Store lock poisoned; dropping write to '{key}'");
            return;
        };
        let current = m.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
        let projected = Self::used_bytes(&m) - current + key.len() + value.len();
        if projected > self.quota_bytes {
            warn!("[cache] Quota exceeded writing '{key}' ({projected} > {} bytes); write dropped", self.quota_bytes);
            return;
        }
        let previous = m.insert(key.to_string(), value.to_string());
        if !self.persist(&m) {
            match previous {
                Some(v) => m.insert(key.to_string(), v),
                None => m.remove(key),
            };
        }
    }

    fn remove(&self, key: &str) {
        let Ok(mut m) = self.entries.write() else {
            error!("[cache] Store lock poisoned; dropping removal of '{key}'");
            return;
        };
        if let Some(previous) = m.remove(key) {
            if !self.persist(&m) {
                m.insert(key.to_string(), previous);
            }
        }
    }
}

/// Process-local store, used in tests and when no persistence is wanted.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, String>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
