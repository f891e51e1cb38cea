//! Namespaced memory store
//!
//! Records live under `(memories, user_id, category)` and are keyed by id
//! within that namespace. `put` is an unconditional overwrite, so writing the
//! same id and payload twice leaves the same visible state. Content is never
//! de-duplicated here; spotting an existing memory and passing its id is the
//! caller's job.
//!
//! `InMemoryStore` shards its map with `DashMap`, so writers touching
//! different keys do not contend on a single lock. Two writers racing on
//! the same key resolve last-writer-wins.

use super::record::{Category, MemoryRecord, MemoryValue, Namespace, NamespacePrefix};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Persistence contract for memories.
///
/// Implementations must keep users and categories in disjoint key spaces
/// and must treat lookups of missing keys as empty results, not errors.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or overwrite the record at `(user_id, category, id)`.
    ///
    /// `category` is validated here: anything outside the fixed category set
    /// fails with `Error::Validation` and leaves the store untouched.
    async fn put(
        &self,
        user_id: &str,
        category: &str,
        id: &str,
        value: MemoryValue,
    ) -> Result<MemoryRecord>;

    /// Fetch a single record
    async fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<MemoryRecord>>;

    /// All records under a namespace prefix. Order is unspecified.
    async fn search(&self, prefix: &NamespacePrefix) -> Result<Vec<MemoryRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    namespace: Namespace,
    id: String,
}

/// In-memory memory store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<DashMap<RecordKey, MemoryValue>>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all namespaces
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn put(
        &self,
        user_id: &str,
        category: &str,
        id: &str,
        value: MemoryValue,
    ) -> Result<MemoryRecord> {
        let category: Category = category.parse()?;
        let namespace = Namespace::new(user_id, category);
        let key = RecordKey {
            namespace: namespace.clone(),
            id: id.to_string(),
        };

        self.records.insert(key, value.clone());
        tracing::debug!(namespace = %namespace, id = %id, "Stored memory record");

        Ok(MemoryRecord {
            id: id.to_string(),
            namespace,
            value,
        })
    }

    async fn get(&self, namespace: &Namespace, id: &str) -> Result<Option<MemoryRecord>> {
        let key = RecordKey {
            namespace: namespace.clone(),
            id: id.to_string(),
        };
        Ok(self.records.get(&key).map(|entry| MemoryRecord {
            id: key.id.clone(),
            namespace: key.namespace.clone(),
            value: entry.value().clone(),
        }))
    }

    async fn search(&self, prefix: &NamespacePrefix) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| prefix.matches(&entry.key().namespace))
            .map(|entry| MemoryRecord {
                id: entry.key().id.clone(),
                namespace: entry.key().namespace.clone(),
                value: entry.value().clone(),
            })
            .collect())
    }
}
