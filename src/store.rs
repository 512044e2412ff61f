use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::types::VehicleRecord;

/// Opaque string-keyed, string-valued persistence.
pub trait BlobStore: Send + Sync {
    /// Stores `value` under `key`. Fails if `key` is already taken.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Process-lifetime blobs. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut blobs = self.blobs.lock().map_err(|_| StoreError::Poisoned)?;
        if blobs.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let blobs = self.blobs.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(blobs.get(key).cloned())
    }
}

/// Vehicle records on top of a blob backend, stored as JSON text keyed by id.
#[derive(Clone)]
pub struct RecordStore {
    blobs: Arc<dyn BlobStore>,
}

impl RecordStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        RecordStore { blobs }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    pub fn put(&self, id: &str, record: &VehicleRecord) -> Result<(), StoreError> {
        let text = serde_json::to_string(record)?;
        debug!("Writing record {} ({} bytes)", id, text.len());
        self.blobs.set(id, &text)
    }

    pub fn get(&self, id: &str) -> Result<Option<VehicleRecord>, StoreError> {
        match self.blobs.get(id)? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}
