//! Storage module - Opaque key-value persistence for the coordinator
//!
//! Two areas mirror how the records are scoped:
//! - `sync`: the settings record, shared across the user's devices
//! - `local`: usage data, kept on this device only
//!
//! Records are read and written wholesale as JSON values.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Key of the settings record in the sync area
pub const SETTINGS_KEY: &str = "settings";

/// Key of the usage record in the local area
pub const USAGE_KEY: &str = "usageData";

/// Errors that can occur in a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The area exists but is not a JSON object
    #[error("Corrupt storage area: {0}")]
    Corrupt(String),
}

/// An async get/set store for JSON records
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value under `key`, `None` if never written
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the value under `key`
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// The pair of storage areas the coordinator owns
#[derive(Clone)]
pub struct Storage {
    sync: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(sync: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { sync, local }
    }

    /// Two independent in-memory areas
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// `sync.json` and `local.json` under `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(
            Arc::new(JsonFileStore::new(dir.join("sync.json"))),
            Arc::new(JsonFileStore::new(dir.join("local.json"))),
        )
    }

    pub fn sync(&self) -> &dyn KeyValueStore {
        self.sync.as_ref()
    }

    pub fn local(&self) -> &dyn KeyValueStore {
        self.local.as_ref()
    }
}

/// Reads and decodes a typed record
pub async fn read_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

/// Encodes and writes a typed record
pub async fn write_record<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(record)?).await
}
