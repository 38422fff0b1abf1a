//! Key-value storage backends and the adapter the todo store talks to.
//!
//! [`FileStorage`] keeps one JSON object on disk, the way a browser profile
//! keeps its local storage; [`MemoryStorage`] lives only as long as the
//! process. Both implement [`Storage`] so the adapter does not care which one
//! it wraps.

use crate::types::TodoId;
use localtodo_core::environment::{Storage, StorageError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
}

/// Process-local storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `entries`
    #[must_use]
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.entries)?.keys().cloned().collect())
    }
}

/// Storage persisted as a single JSON object file
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens (or lazily creates) the storage document at `path`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the file exists but cannot be read and
    /// [`StorageError::Corrupted`] if it is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e)),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Opened storage file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the storage document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let document = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Corrupted(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, document)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries)?;
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(error) = self.flush(&entries) {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(error);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = lock(&self.entries)?;
        if let Some(previous) = entries.remove(key) {
            if let Err(error) = self.flush(&entries) {
                entries.insert(key.to_string(), previous);
                return Err(error);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.entries)?.keys().cloned().collect())
    }
}

/// Stand-in for a backend that could not be opened
///
/// Every call fails with the original reason, so the probe reports the
/// storage as unavailable and the app runs in memory only.
#[derive(Debug)]
pub struct UnavailableStorage {
    reason: String,
}

impl UnavailableStorage {
    /// Creates a backend that always fails with `reason`
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn refuse(&self) -> StorageError {
        StorageError::Unavailable(self.reason.clone())
    }
}

impl Storage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(self.refuse())
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(self.refuse())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(self.refuse())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(self.refuse())
    }
}

/// The todo store's view of a storage backend
///
/// Todo keys are namespaced with a fixed prefix so unrelated keys sharing
/// the backend are never listed or touched.
#[derive(Clone)]
pub struct StorageAdapter {
    backend: Arc<dyn Storage>,
    prefix: String,
}

impl StorageAdapter {
    /// Throwaway key written and deleted by [`StorageAdapter::probe`]
    pub const PROBE_KEY: &'static str = "__localtodo_storage_probe__";

    /// Wraps `backend`, namespacing record keys with `prefix`
    #[must_use]
    pub fn new(backend: Arc<dyn Storage>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Record key prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Checks whether the backend accepts a write and a delete
    ///
    /// Never fails: any error is logged and reported as `false`.
    #[must_use]
    pub fn probe(&self) -> bool {
        let outcome = self
            .backend
            .set(Self::PROBE_KEY, Self::PROBE_KEY)
            .and_then(|()| self.backend.remove(Self::PROBE_KEY));

        match outcome {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(error = %error, "Storage probe failed, storage unavailable");
                false
            },
        }
    }

    /// Reads `key`
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.backend.get(key)
    }

    /// Writes `key`
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.backend.set(key, value)
    }

    /// Removes `key`
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(key)
    }

    /// Lists every key in the backend, todo or not
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        self.backend.keys()
    }

    /// Key under which the record for `id` is stored
    #[must_use]
    pub fn record_key(&self, id: TodoId) -> String {
        format!("{}{id}", self.prefix)
    }

    /// Keys belonging to todo records, sorted
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`StorageError`].
    pub fn todo_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .backend
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(&self.prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Removes every key in `keys`, returning how many removals succeeded
    pub fn purge(&self, keys: &[String]) -> usize {
        keys.iter()
            .filter(|key| match self.backend.remove(key) {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Could not remove key");
                    false
                },
            })
            .count()
    }
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use localtodo_testing::FailingStorage;

    const PREFIX: &str = "todo-2025-b--todo_";

    fn adapter_over(storage: impl Storage + 'static) -> StorageAdapter {
        StorageAdapter::new(Arc::new(storage), PREFIX)
    }

    #[test]
    fn memory_storage_basic_operations() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);

        storage.set("a", "1").unwrap();
        storage.set("b", "2").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);

        storage.remove("a").unwrap();
        storage.remove("missing").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn probe_succeeds_and_cleans_up() {
        let storage = Arc::new(MemoryStorage::new());
        let adapter = StorageAdapter::new(storage.clone(), PREFIX);

        assert!(adapter.probe());
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn probe_reports_false_instead_of_failing() {
        assert!(!adapter_over(FailingStorage::disabled()).probe());
        assert!(!adapter_over(FailingStorage::full()).probe());
    }

    #[test]
    fn unavailable_storage_fails_probe_with_reason() {
        let storage = UnavailableStorage::new("profile locked");
        assert!(matches!(
            storage.keys(),
            Err(StorageError::Unavailable(reason)) if reason == "profile locked"
        ));
        assert!(!adapter_over(storage).probe());
    }

    #[test]
    fn todo_keys_only_lists_prefixed_keys() {
        let adapter = adapter_over(MemoryStorage::with_entries([
            (format!("{PREFIX}2"), "{}"),
            ("theme".to_string(), "dark"),
            (format!("{PREFIX}10"), "{}"),
            ("todo-2025-a--todo_1".to_string(), "{}"),
        ]));

        assert_eq!(
            adapter.todo_keys().unwrap(),
            vec![format!("{PREFIX}10"), format!("{PREFIX}2")]
        );
        assert_eq!(adapter.list_keys().unwrap().len(), 4);
    }

    #[test]
    fn record_key_appends_id() {
        let adapter = adapter_over(MemoryStorage::new());
        assert_eq!(adapter.record_key(TodoId::new(7)), format!("{PREFIX}7"));
    }

    #[test]
    fn purge_counts_removals() {
        let adapter = adapter_over(MemoryStorage::with_entries([("a", "1"), ("b", "2")]));
        assert_eq!(adapter.purge(&["a".to_string(), "b".to_string()]), 2);
        assert!(adapter.list_keys().unwrap().is_empty());

        assert_eq!(adapter_over(FailingStorage::disabled()).purge(&["a".to_string()]), 0);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("k1", "v1").unwrap();
            storage.set("k2", "v2").unwrap();
            storage.remove("k1").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["k2"]);
        assert_eq!(reopened.get("k2").unwrap().as_deref(), Some("v2"));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn file_storage_rejects_corrupted_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        assert!(matches!(
            FileStorage::open(&path),
            Err(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn file_storage_write_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("profile.json");

        let storage = FileStorage::open(&path).unwrap();
        assert!(storage.set("k", "v").is_err());
        assert_eq!(storage.get("k").unwrap(), None);
    }
}
