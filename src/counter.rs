//! Keyed counter store for sequence and box numbers.
//!
//! The identifier generator and the slot allocator are the only
//! consumers of mutable shared state in the engine, and both reach it
//! through the [`CounterStore`] trait: an explicit, injected dependency
//! whose sole mutating operation is an atomic increment. Keys scope a
//! counter to `(facility, date, hour)` for item-id sequences or
//! `(facility, date)` for box sequences; a key's counter starts at 1 on
//! first increment and never resets — old keys are simply never
//! incremented again once the clock moves on.
//!
//! Two implementations:
//! - [`MemoryCounterStore`] — `RwLock<HashMap>`; tests and embedded use.
//! - [`FileCounterStore`] — JSON state file so the CLI keeps counts
//!   across invocations. The incremented value is persisted before it
//!   is handed out: a crash can leave a gap in the sequence, never a
//!   repeat.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::EngineError;

/// Scope of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Item-id sequence within one facility-hour.
    Hour {
        facility: String,
        date: NaiveDate,
        hour: u32,
    },
    /// Default-slot assignment count within one facility-day.
    Day { facility: String, date: NaiveDate },
}

impl CounterKey {
    /// Stable string form used as the storage key.
    pub fn storage_key(&self) -> String {
        match self {
            CounterKey::Hour {
                facility,
                date,
                hour,
            } => format!("{}/{}/h{}", facility, date.format("%Y-%m-%d"), hour),
            CounterKey::Day { facility, date } => {
                format!("{}/{}", facility, date.format("%Y-%m-%d"))
            }
        }
    }
}

/// Abstract keyed counter backend.
///
/// Implementations must guarantee that concurrent `increment` calls for
/// the same key never observe or emit the same value, and that no value
/// is skipped while the process stays alive.
pub trait CounterStore: Send + Sync {
    /// Atomically bump the counter for `key` and return the new value.
    ///
    /// The first call for a key returns 1.
    fn increment(&self, key: &CounterKey) -> Result<u64, EngineError>;

    /// Current value for `key` without incrementing (0 if never used).
    fn current(&self, key: &CounterKey) -> Result<u64, EngineError>;
}

/// In-memory counter store.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counts: RwLock<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn increment(&self, key: &CounterKey) -> Result<u64, EngineError> {
        let mut counts = self
            .counts
            .write()
            .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        let entry = counts.entry(key.storage_key()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    fn current(&self, key: &CounterKey) -> Result<u64, EngineError> {
        let counts = self
            .counts
            .read()
            .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        Ok(counts.get(&key.storage_key()).copied().unwrap_or(0))
    }
}

/// JSON-file-backed counter store for the CLI.
///
/// All state lives in one flat `{storage_key: count}` object. Every
/// increment rewrites the file while holding the lock, so two commands
/// in the same process serialize; concurrent *processes* need an
/// external run lock, same as the relocation batch.
pub struct FileCounterStore {
    path: PathBuf,
    counts: Mutex<HashMap<String, u64>>,
}

impl FileCounterStore {
    /// Open (or create) the counter state file.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let counts = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| EngineError::CounterStore(format!("{}: {}", path.display(), e)))?;
            serde_json::from_str(&content)
                .map_err(|e| EngineError::CounterStore(format!("{}: {}", path.display(), e)))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            counts: Mutex::new(counts),
        })
    }

    fn persist(&self, counts: &HashMap<String, u64>) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(counts)
            .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| EngineError::CounterStore(format!("{}: {}", self.path.display(), e)))
    }
}

impl CounterStore for FileCounterStore {
    fn increment(&self, key: &CounterKey) -> Result<u64, EngineError> {
        let mut counts = self
            .counts
            .lock()
            .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        let entry = counts.entry(key.storage_key()).or_insert(0);
        *entry += 1;
        let value = *entry;
        // Persist before the number is used anywhere.
        self.persist(&counts)?;
        Ok(value)
    }

    fn current(&self, key: &CounterKey) -> Result<u64, EngineError> {
        let counts = self
            .counts
            .lock()
            .map_err(|e| EngineError::CounterStore(e.to_string()))?;
        Ok(counts.get(&key.storage_key()).copied().unwrap_or(0))
    }
}
