//! Storage - the persistence boundary for bot state
//!
//! The engine never talks to a database directly. Bot state reads and writes
//! JSON documents through the [`Storage`] trait; [`InMemoryStorage`] is the
//! backend used by tests and demos.

use crate::error::DialogResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Key/value persistence for state documents
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the documents stored under `keys`; missing keys are simply absent
    async fn read(&self, keys: &[String]) -> DialogResult<HashMap<String, Value>>;

    /// Write (upsert) documents
    async fn write(&self, changes: HashMap<String, Value>) -> DialogResult<()>;

    /// Delete documents; deleting a missing key is not an error
    async fn delete(&self, keys: &[String]) -> DialogResult<()>;
}

/// Process-local storage backed by a hash map
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<String, Value>>,
}

impl InMemoryStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of a single document
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn read(&self, keys: &[String]) -> DialogResult<HashMap<String, Value>> {
        let data = self.data.read();
        let items = keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        Ok(items)
    }

    async fn write(&self, changes: HashMap<String, Value>) -> DialogResult<()> {
        tracing::trace!(count = changes.len(), "Writing state documents");
        self.data.write().extend(changes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> DialogResult<()> {
        let mut data = self.data.write();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
