// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store doubles whose every operation fails.
//!
//! Used to drive the degraded paths of the context pipeline: working memory
//! falling back to defaults, profile linking giving up, history search
//! returning nothing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use parley_core::types::{
    AdapterType, DocumentFilter, HealthStatus, PayloadFilter, ScoredPoint, VectorPoint,
};
use parley_core::{CacheStore, DocumentStore, ParleyError, PluginAdapter, VectorStore};

macro_rules! failing_adapter {
    ($ty:ident, $name:literal, $kind:expr) => {
        #[async_trait]
        impl PluginAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> semver::Version {
                semver::Version::new(0, 1, 0)
            }

            fn adapter_type(&self) -> AdapterType {
                $kind
            }

            async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
                Ok(HealthStatus::Unhealthy(format!("{} is unavailable", $name)))
            }

            async fn shutdown(&self) -> Result<(), ParleyError> {
                Ok(())
            }
        }
    };
}

fn down(what: &str) -> ParleyError {
    ParleyError::storage(format!("{what} is unavailable"))
}

/// A cache that rejects every call.
#[derive(Debug, Default)]
pub struct FailingCache;

failing_adapter!(FailingCache, "failing-cache", AdapterType::Cache);

#[async_trait]
impl CacheStore for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, ParleyError> {
        Err(down("cache"))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), ParleyError> {
        Err(down("cache"))
    }

    async fn hget_all(&self, _key: &str) -> Result<HashMap<String, String>, ParleyError> {
        Err(down("cache"))
    }

    async fn hset(&self, _key: &str, _fields: &[(String, String)]) -> Result<(), ParleyError> {
        Err(down("cache"))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, ParleyError> {
        Err(down("cache"))
    }

    async fn delete(&self, _key: &str) -> Result<bool, ParleyError> {
        Err(down("cache"))
    }

    async fn scan(&self, _pattern: &str) -> Result<Vec<String>, ParleyError> {
        Err(down("cache"))
    }
}

/// A document store that rejects every call.
#[derive(Debug, Default)]
pub struct FailingDocumentStore;

failing_adapter!(FailingDocumentStore, "failing-documents", AdapterType::DocumentStore);

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn insert(&self, _collection: &str, _id: &str, _doc: &Value) -> Result<(), ParleyError> {
        Err(down("document store"))
    }

    async fn find_by_id(&self, _collection: &str, _id: &str) -> Result<Option<Value>, ParleyError> {
        Err(down("document store"))
    }

    async fn find_one(
        &self,
        _collection: &str,
        _filter: &DocumentFilter,
    ) -> Result<Option<Value>, ParleyError> {
        Err(down("document store"))
    }

    async fn find_many(
        &self,
        _collection: &str,
        _filter: &DocumentFilter,
    ) -> Result<Vec<Value>, ParleyError> {
        Err(down("document store"))
    }

    async fn update(&self, _collection: &str, _id: &str, _doc: &Value) -> Result<bool, ParleyError> {
        Err(down("document store"))
    }

    async fn push_bounded(
        &self,
        _collection: &str,
        _id: &str,
        _field: &str,
        _item: &Value,
        _cap: usize,
    ) -> Result<bool, ParleyError> {
        Err(down("document store"))
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<bool, ParleyError> {
        Err(down("document store"))
    }
}

/// A vector store that rejects every call.
#[derive(Debug, Default)]
pub struct FailingVectorStore;

failing_adapter!(FailingVectorStore, "failing-vectors", AdapterType::VectorStore);

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn ensure_collection(&self, _dimensions: usize) -> Result<(), ParleyError> {
        Err(ParleyError::vector_store("vector store is unavailable"))
    }

    async fn upsert(&self, _point: VectorPoint) -> Result<(), ParleyError> {
        Err(ParleyError::vector_store("vector store is unavailable"))
    }

    async fn search(
        &self,
        _vector: &[f32],
        _filter: &PayloadFilter,
        _limit: usize,
        _score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, ParleyError> {
        Err(ParleyError::vector_store("vector store is unavailable"))
    }

    async fn scroll(
        &self,
        _filter: &PayloadFilter,
        _limit: usize,
    ) -> Result<Vec<VectorPoint>, ParleyError> {
        Err(ParleyError::vector_store("vector store is unavailable"))
    }

    async fn delete_by_filter(&self, _filter: &PayloadFilter) -> Result<(), ParleyError> {
        Err(ParleyError::vector_store("vector store is unavailable"))
    }
}
