//! Mirroring the todo collection into storage.
//!
//! The reducer never touches storage directly. It asks [`Persistence`] for
//! effects describing the writes a mutation needs; the runtime executes them
//! after the state transition has already happened. Writes are deferred by a
//! short delay and removals go out immediately. A deferred write that has been
//! superseded by a later write or removal of the same key is skipped. A failed
//! write is logged and dropped.

use crate::codec::{self, CodecError};
use crate::storage::StorageAdapter;
use crate::types::{Timestamp, Todo, TodoAction, TodoId};
use localtodo_core::effect::Effect;
use localtodo_core::environment::StorageError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default key prefix for per-record storage
pub const DEFAULT_KEY_PREFIX: &str = "todo-2025-b--todo_";

/// Default key for snapshot storage
pub const DEFAULT_SNAPSHOT_KEY: &str = "todo-2025-b";

/// Default delay before a write reaches storage
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(100);

/// How the collection is laid out in storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceLayout {
    /// One key per todo: `{prefix}{id}` holding the encoded record
    PerRecord,
    /// The whole collection as one JSON array under `key`
    Snapshot {
        /// Storage key of the array
        key: String,
    },
}

/// What a write is expected to find in storage, for diagnostics only
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// A freshly created record; the key should not exist yet
    Created,
    /// An edit of an existing record; the key should already exist
    Updated,
}

/// Records recovered from storage at startup
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Records that passed validation, ascending by id
    pub records: Vec<Todo>,
    /// Keys (or `key[index]` positions) holding records that failed validation
    pub corrupted_keys: Vec<String>,
    /// Whether the default seed collection was used
    pub seeded: bool,
}

/// The collection a snapshot layout starts with on first run
#[must_use]
pub fn default_seed() -> Vec<Todo> {
    let seed = |id: i64, text: &str, created_at: &str| Todo {
        id: TodoId::new(id),
        text: text.to_string(),
        is_completed: false,
        created_at: Some(Timestamp::from_raw(created_at)),
        last_updated_at: None,
        completed_at: None,
    };

    vec![
        seed(1, "Buy avocado", "2026-01-01T10:00:00.000Z"),
        seed(2, "Do 50 push-ups", "2026-01-02T11:00:00.000Z"),
    ]
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    /// The latest write has not reached storage yet
    pending: bool,
    /// Deferred writes still holding a ticket for this key
    in_flight: usize,
}

/// Latest write generation per storage key
///
/// A key is tracked only while deferred writes to it are in flight, so a
/// pending write holding an older generation knows it has been superseded.
#[derive(Clone, Debug, Default)]
struct Generations(Arc<Mutex<HashMap<String, Slot>>>);

impl Generations {
    /// Claims the next generation of `key` for a deferred write, also
    /// reporting whether it replaced a write that had not landed yet
    fn begin_write(&self, key: &str) -> (WriteTicket, bool) {
        let mut generation = 0;
        let mut replaced_pending = false;
        if let Ok(mut slots) = self.0.lock() {
            let slot = slots.entry(key.to_string()).or_default();
            slot.generation += 1;
            slot.in_flight += 1;
            generation = slot.generation;
            replaced_pending = std::mem::replace(&mut slot.pending, true);
        }
        let ticket = WriteTicket {
            generations: self.clone(),
            key: key.to_string(),
            generation,
        };
        (ticket, replaced_pending)
    }

    /// Supersedes every write to `key` still waiting to fire
    fn removed(&self, key: &str) {
        if let Ok(mut slots) = self.0.lock() {
            if let Some(slot) = slots.get_mut(key) {
                slot.generation += 1;
                slot.pending = false;
            }
        }
    }

    fn is_latest(&self, key: &str, generation: u64) -> bool {
        self.0.lock().map_or(true, |slots| {
            slots.get(key).is_none_or(|slot| slot.generation == generation)
        })
    }

    fn finish(&self, key: &str, generation: u64) {
        let Ok(mut slots) = self.0.lock() else {
            return;
        };
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        slot.in_flight = slot.in_flight.saturating_sub(1);
        if slot.generation == generation {
            slot.pending = false;
        }
        if slot.in_flight == 0 {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.0.lock().map_or(0, |slots| slots.len())
    }
}

/// Held by one deferred write; releases its slot when the write finishes,
/// is skipped or is dropped unrun
struct WriteTicket {
    generations: Generations,
    key: String,
    generation: u64,
}

impl WriteTicket {
    fn is_latest(&self) -> bool {
        self.generations.is_latest(&self.key, self.generation)
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        self.generations.finish(&self.key, self.generation);
    }
}

/// Storage adapter, layout and write timing used by the todo reducer
#[derive(Clone, Debug)]
pub struct Persistence {
    adapter: StorageAdapter,
    layout: PersistenceLayout,
    write_delay: Duration,
    generations: Generations,
}

impl Persistence {
    /// Creates a persistence mirror
    #[must_use]
    pub fn new(adapter: StorageAdapter, layout: PersistenceLayout, write_delay: Duration) -> Self {
        Self {
            adapter,
            layout,
            write_delay,
            generations: Generations::default(),
        }
    }

    /// The wrapped storage adapter
    #[must_use]
    pub const fn adapter(&self) -> &StorageAdapter {
        &self.adapter
    }

    /// The storage layout
    #[must_use]
    pub const fn layout(&self) -> &PersistenceLayout {
        &self.layout
    }

    /// Effect persisting one created or edited todo
    ///
    /// `all` is the collection after the mutation, used by the snapshot layout.
    #[must_use]
    pub fn record_written(&self, todo: &Todo, kind: WriteKind, all: &[Todo]) -> Effect<TodoAction> {
        match &self.layout {
            PersistenceLayout::PerRecord => self.save_record(todo, kind),
            PersistenceLayout::Snapshot { key } => self.save_snapshot(key, all),
        }
    }

    /// Effect persisting several edited todos
    #[must_use]
    pub fn records_written(&self, todos: &[&Todo], all: &[Todo]) -> Effect<TodoAction> {
        if todos.is_empty() {
            return Effect::None;
        }
        match &self.layout {
            PersistenceLayout::PerRecord => Effect::merge(
                todos
                    .iter()
                    .map(|todo| self.save_record(todo, WriteKind::Updated))
                    .collect(),
            ),
            PersistenceLayout::Snapshot { key } => self.save_snapshot(key, all),
        }
    }

    /// Effect removing the records for `ids`
    #[must_use]
    pub fn records_removed(&self, ids: &[TodoId], all: &[Todo]) -> Effect<TodoAction> {
        if ids.is_empty() {
            return Effect::None;
        }
        match &self.layout {
            PersistenceLayout::PerRecord => {
                Effect::merge(ids.iter().map(|id| self.remove_record(*id)).collect())
            },
            PersistenceLayout::Snapshot { key } => self.save_snapshot(key, all),
        }
    }

    fn save_record(&self, todo: &Todo, kind: WriteKind) -> Effect<TodoAction> {
        let blob = match codec::encode(todo) {
            Ok(blob) => blob,
            Err(error) => {
                tracing::error!(id = %todo.id, error = %error, "Could not encode todo, skipping write");
                return Effect::None;
            },
        };
        let key = self.adapter.record_key(todo.id);
        self.deferred_write(key, blob, Some(kind))
    }

    fn save_snapshot(&self, key: &str, all: &[Todo]) -> Effect<TodoAction> {
        match codec::encode_collection(all) {
            Ok(blob) => self.deferred_write(key.to_string(), blob, None),
            Err(error) => {
                tracing::error!(error = %error, "Could not encode todo collection, skipping write");
                Effect::None
            },
        }
    }

    fn deferred_write(&self, key: String, blob: String, kind: Option<WriteKind>) -> Effect<TodoAction> {
        let adapter = self.adapter.clone();
        let (ticket, replaced_pending) = self.generations.begin_write(&key);
        // The replaced write never reached storage, so its key state says nothing
        let kind = if replaced_pending { None } else { kind };
        let delay = self.write_delay;

        Effect::fire_and_forget(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !ticket.is_latest() {
                tracing::debug!(key = %key, "Write superseded, skipping");
                return;
            }

            match (kind, adapter.get(&key)) {
                (Some(WriteKind::Created), Ok(Some(_))) => {
                    tracing::error!(key = %key, "Storage already has an item under this key, overwriting");
                },
                (Some(WriteKind::Updated), Ok(None)) => {
                    tracing::error!(key = %key, "Storage has no item under this key, creating");
                },
                _ => {},
            }

            match adapter.set(&key, &blob) {
                Ok(()) => tracing::debug!(key = %key, "Persisted"),
                Err(error) => tracing::warn!(key = %key, error = %error, "Write failed, change kept in memory only"),
            }
            drop(ticket);
        })
    }

    fn remove_record(&self, id: TodoId) -> Effect<TodoAction> {
        let adapter = self.adapter.clone();
        let key = adapter.record_key(id);
        self.generations.removed(&key);

        Effect::fire_and_forget(async move {
            match adapter.remove(&key) {
                Ok(()) => tracing::debug!(key = %key, "Removed persisted record"),
                Err(error) => tracing::warn!(key = %key, error = %error, "Could not remove persisted record"),
            }
        })
    }

    /// Reads every todo record from storage
    ///
    /// Records failing validation are listed in
    /// [`LoadReport::corrupted_keys`] and left out; they never abort the load.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] only when storage itself cannot be read.
    pub fn load(&self) -> Result<LoadReport, StorageError> {
        match &self.layout {
            PersistenceLayout::PerRecord => self.load_records(),
            PersistenceLayout::Snapshot { key } => self.load_snapshot(key),
        }
    }

    fn load_records(&self) -> Result<LoadReport, StorageError> {
        let keys = self.adapter.todo_keys()?;
        if keys.is_empty() {
            tracing::info!("No todo records found in storage");
            return Ok(LoadReport::default());
        }

        let mut report = LoadReport::default();
        for key in keys {
            let Some(blob) = self.adapter.get(&key)? else {
                tracing::debug!(key = %key, "Key vanished while loading, skipping");
                continue;
            };

            match codec::decode(&blob) {
                Ok(todo) => report.records.push(todo),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Skipping corrupted todo record");
                    report.corrupted_keys.push(key);
                },
            }
        }

        report.records.sort_by_key(|todo| todo.id);
        tracing::info!(
            loaded = report.records.len(),
            corrupted = report.corrupted_keys.len(),
            "Loaded todo records"
        );
        Ok(report)
    }

    fn load_snapshot(&self, key: &str) -> Result<LoadReport, StorageError> {
        let Some(blob) = self.adapter.get(key)? else {
            tracing::info!(key = %key, "No snapshot found, starting from the default seed");
            return Ok(LoadReport {
                records: default_seed(),
                corrupted_keys: Vec::new(),
                seeded: true,
            });
        };

        match codec::decode_collection(&blob) {
            Ok(decoded) => {
                let corrupted_keys = decoded
                    .rejected
                    .iter()
                    .map(|(index, error)| {
                        tracing::warn!(key = %key, index, error = %error, "Skipping corrupted snapshot element");
                        format!("{key}[{index}]")
                    })
                    .collect();
                Ok(LoadReport {
                    records: decoded.records,
                    corrupted_keys,
                    seeded: false,
                })
            },
            Err(error) => {
                tracing::warn!(key = %key, error = %error, "Snapshot is unreadable, starting from the default seed");
                Ok(LoadReport {
                    records: default_seed(),
                    corrupted_keys: vec![key.to_string()],
                    seeded: true,
                })
            },
        }
    }

    /// Deletes corrupted records reported by [`Persistence::load`]
    ///
    /// In the snapshot layout the bad elements live inside the snapshot, so
    /// the snapshot is rewritten from `current` instead.
    ///
    /// Returns how many of `keys` were dealt with.
    #[must_use]
    pub fn discard_corrupted(&self, keys: &[String], current: &[Todo]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        match &self.layout {
            PersistenceLayout::PerRecord => self.adapter.purge(keys),
            PersistenceLayout::Snapshot { key } => {
                let written = codec::encode_collection(current)
                    .map_err(|error: CodecError| error.to_string())
                    .and_then(|blob| self.adapter.set(key, &blob).map_err(|e| e.to_string()));
                match written {
                    Ok(()) => keys.len(),
                    Err(error) => {
                        tracing::warn!(key = %key, error = %error, "Could not rewrite snapshot");
                        0
                    },
                }
            },
        }
    }
}
