//! Key-value persistence for the namereg registry.
//!
//! The registry treats its backing store as an opaque map from string keys to
//! byte values: `get`, `set` and full enumeration are the only operations, and
//! each is atomic on its own. Anything larger, such as a read-modify-write of
//! a record, must be serialized through [`KeyLocks`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use sled::{Db, Tree};

pub mod locks;

pub use locks::KeyLocks;

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("store key is not valid UTF-8")]
    InvalidKey,
}

/// Abstract key-value store: string keys, opaque byte values.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
    /// Enumerate every entry in the store.
    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

/// Sled-backed implementation.
pub struct SledKvStore {
    db: Db,
    records: Tree,
}

impl SledKvStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let records = db.open_tree("identities")?;
        Ok(Self { db, records })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl KvStore for SledKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.records.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.records.insert(key.as_bytes(), value)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec()).map_err(|_| StorageError::InvalidKey)?;
            out.push((key, value.to_vec()));
        }
        Ok(out)
    }
}

/// In-memory testing backend.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
