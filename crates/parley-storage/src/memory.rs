// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process DocumentStore for tests and ephemeral shells.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use parley_core::types::DocumentFilter;
use parley_core::{AdapterType, DocumentStore, HealthStatus, ParleyError, PluginAdapter};

use crate::queries::documents::append_capped;

/// Documents keyed by `(collection, id)`, ordered by insertion sequence.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<(String, String), (u64, Value)>,
    seq: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }

    fn matching(&self, collection: &str, filter: &DocumentFilter) -> Vec<Value> {
        let mut found: Vec<(u64, Value)> = self
            .docs
            .iter()
            .filter(|e| e.key().0 == collection && filter.accepts(&e.value().1))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|(seq, _)| *seq);
        found.into_iter().map(|(_, doc)| doc).collect()
    }
}

#[async_trait]
impl PluginAdapter for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory-documents"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::DocumentStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), ParleyError> {
        use dashmap::mapref::entry::Entry;

        match self.docs.entry(Self::key(collection, id)) {
            Entry::Occupied(_) => Err(ParleyError::storage(format!(
                "duplicate document id `{id}` in `{collection}`"
            ))),
            Entry::Vacant(slot) => {
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, doc.clone()));
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, ParleyError> {
        Ok(self
            .docs
            .get(&Self::key(collection, id))
            .map(|e| e.value().1.clone()))
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>, ParleyError> {
        Ok(self.matching(collection, filter).into_iter().next())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Value>, ParleyError> {
        Ok(self.matching(collection, filter))
    }

    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<bool, ParleyError> {
        match self.docs.get_mut(&Self::key(collection, id)) {
            Some(mut entry) => {
                entry.1 = doc.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_bounded(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: &Value,
        cap: usize,
    ) -> Result<bool, ParleyError> {
        match self.docs.get_mut(&Self::key(collection, id)) {
            Some(mut entry) => {
                append_capped(&mut entry.1, field, item.clone(), cap);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, ParleyError> {
        Ok(self.docs.remove(&Self::key(collection, id)).is_some())
    }
}
