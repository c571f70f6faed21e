use crate::session::{SessionStorage, StorageError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Session storage held in memory.
///
/// Counts writes and can be told to fail them.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: Mutex<Option<String>>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage already holding `raw`.
    #[must_use]
    pub fn with_raw(raw: &str) -> Self {
        Self {
            record: Mutex::new(Some(raw.to_string())),
            ..Self::default()
        }
    }

    /// The stored record.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.raw())
    }

    fn save(&self, raw: &str) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io("storage unavailable".to_string()));
        }
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
