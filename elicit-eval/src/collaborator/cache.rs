//! Response cache
//!
//! Raw collaborator responses are cached per `(subject, model,
//! template_hash)` so that re-running a stage with the same template replays
//! identical text. The storage backend is injectable; the filesystem backend
//! is write-once per key (temporary file + atomic rename, existing entries
//! are never replaced).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Hex digest of the given parts, truncated to `len` characters
fn digest(parts: &[&str], len: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(len);
    hex
}

/// Stable hash identifying a prompt template (and any variant tag)
pub fn template_hash(parts: &[&str]) -> String {
    digest(parts, 16)
}

/// Short digest of free text, used to tie predictions to the description they read
pub fn text_digest(text: &str) -> String {
    digest(&[text], 12)
}

/// Identity of a cached response
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// What was asked about, e.g. `p01/c3`
    pub subject: String,
    pub model: String,
    pub template_hash: String,
}

impl CacheKey {
    pub fn new(subject: impl Into<String>, model: impl Into<String>, template_hash: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            model: model.into(),
            template_hash: template_hash.into(),
        }
    }

    fn file_stem(&self) -> String {
        digest(&[&self.subject, &self.model, &self.template_hash], 32)
    }
}

/// On-disk entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    key: CacheKey,
    text: String,
    created_at: DateTime<Utc>,
}

/// Storage backend for cached responses
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> crate::Result<Option<String>>;

    /// Store `text` unless the key already exists; returns whether this call wrote it
    fn put_if_absent(&self, key: &CacheKey, text: &str) -> crate::Result<bool>;
}

/// One JSON file per key under `<root>/<model>/`
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        let model_dir: String = key
            .model
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(model_dir).join(format!("{}.json", key.file_stem()))
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, key: &CacheKey) -> crate::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<CachedResponse>(&content) {
            Ok(entry) if entry.key == *key => Ok(Some(entry.text)),
            Ok(_) => {
                warn!(path = %path.display(), "Cache entry key mismatch, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry, ignoring");
                Ok(None)
            }
        }
    }

    fn put_if_absent(&self, key: &CacheKey, text: &str) -> crate::Result<bool> {
        let path = self.path_for(key);
        if path.exists() {
            return Ok(false);
        }
        let dir = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(dir)?;

        let entry = CachedResponse {
            key: key.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let tmp_path = dir.join(format!(".{}.{}.tmp", key.file_stem(), uuid::Uuid::new_v4()));
        std::fs::write(&tmp_path, serde_json::to_string_pretty(&entry)?)?;

        // Another writer may have finished while we were writing
        if path.exists() {
            let _ = std::fs::remove_file(&tmp_path);
            return Ok(false);
        }
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(true)
    }
}

/// In-process backend for tests and dry runs
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<CacheKey, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> crate::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put_if_absent(&self, key: &CacheKey, text: &str) -> crate::Result<bool> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.clone(), text.to_string());
        Ok(true)
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// Cache handle passed explicitly to every stage that calls the collaborator.
///
/// Cloning shares the backend and counters. Backend failures are logged and
/// treated as misses so a broken cache never aborts a batch.
#[derive(Clone)]
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    counters: Arc<CacheCounters>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            counters: Arc::default(),
        }
    }

    /// Cache that stores nothing
    pub fn disabled() -> Self {
        Self {
            store: None,
            counters: Arc::default(),
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FsCacheStore::new(root)))
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(key) {
            Ok(Some(text)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(subject = %key.subject, model = %key.model, "Cache hit");
                Some(text)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(subject = %key.subject, error = %e, "Cache read failed");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: &CacheKey, text: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_if_absent(key, text) {
                warn!(subject = %key.subject, error = %e, "Cache write failed");
            }
        }
    }

    pub fn hits(&self) -> usize {
        self.counters.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.counters.misses.load(Ordering::Relaxed)
    }
}
