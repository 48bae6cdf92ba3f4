//! Key-value persistence seam.
//!
//! The note store reads and writes opaque blobs through this trait so the
//! backing store (browser local storage behind FFI, a file, an in-memory
//! map in tests) stays decoupled from note logic.

use std::collections::HashMap;
use std::sync::Mutex;

use super::StoreError;

/// Decoupling note logic from the backing blob store
pub trait KeyValueStore: Send + Sync {
    /// Retrieve a blob. Returns None if the key has never been written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a blob, replacing any previous value.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

/// In-memory store, used by tests and short-lived tools
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
