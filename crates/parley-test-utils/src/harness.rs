// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end context pipeline tests.
//!
//! `TestHarness` wires a [`ContextManager`] to a mock provider, a mock
//! embedder, and in-process stores. Any dependency can be swapped for a
//! failing double, and profiles can live in a temp SQLite database.

use std::sync::Arc;

use parley_config::model::{ParleyConfig, StorageConfig};
use parley_context::{ContextBundle, ContextManager, ContextRequest, ContextServices, SessionReport};
use parley_core::types::ChatMessage;
use parley_core::{
    CacheStore, DocumentStore, EmbeddingAdapter, ParleyError, ProviderAdapter, VectorStore,
};
use parley_memory::{EmbedderFactory, Outcome};
use parley_storage::{MemoryCache, MemoryDocumentStore, MemoryVectorStore, SqliteDocumentStore};

use crate::failing::{FailingCache, FailingDocumentStore, FailingVectorStore};
use crate::mock_embedder::MockEmbedder;
use crate::mock_provider::MockProvider;

pub const TEST_TENANT: &str = "tenant-test";
pub const TEST_BOT: &str = "bot-test";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    config: ParleyConfig,
    failing_provider: bool,
    failing_embedder: bool,
    failing_stores: bool,
    sqlite: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            config: ParleyConfig::default(),
            failing_provider: false,
            failing_embedder: false,
            failing_stores: false,
            sqlite: false,
        }
    }

    /// Set mock provider responses, replayed in order.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_config(mut self, config: ParleyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_failing_provider(mut self) -> Self {
        self.failing_provider = true;
        self
    }

    pub fn with_failing_embedder(mut self) -> Self {
        self.failing_embedder = true;
        self
    }

    /// Replace the cache, document store, and vector store with failing doubles.
    pub fn with_failing_stores(mut self) -> Self {
        self.failing_stores = true;
        self
    }

    /// Keep profiles in a temp SQLite database instead of memory.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ParleyError::Storage { source: e.into() })?;

        let provider = Arc::new(if self.failing_provider {
            MockProvider::failing()
        } else {
            MockProvider::with_responses(self.responses)
        });

        let dims = self.config.history.embedding_dimensions;
        let embedder: Arc<dyn EmbeddingAdapter> = if self.failing_embedder {
            Arc::new(MockEmbedder::failing(dims))
        } else {
            Arc::new(MockEmbedder::new(dims))
        };

        let (cache, documents, vectors): (
            Arc<dyn CacheStore>,
            Arc<dyn DocumentStore>,
            Arc<dyn VectorStore>,
        ) = if self.failing_stores {
            (
                Arc::new(FailingCache),
                Arc::new(FailingDocumentStore),
                Arc::new(FailingVectorStore),
            )
        } else if self.sqlite {
            let db_path = temp_dir.path().join("test.db");
            let store = SqliteDocumentStore::open(StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            })
            .await?;
            (
                Arc::new(MemoryCache::new()),
                Arc::new(store),
                Arc::new(MemoryVectorStore::new()),
            )
        } else {
            (
                Arc::new(MemoryCache::new()),
                Arc::new(MemoryDocumentStore::new()),
                Arc::new(MemoryVectorStore::new()),
            )
        };

        let manager = ContextManager::new(
            ContextServices {
                provider: Some(provider.clone() as Arc<dyn ProviderAdapter>),
                cache: Some(cache),
                documents,
                vectors: vectors.clone(),
                embedder: Arc::new(EmbedderFactory::ready(embedder)),
            },
            &self.config,
        );

        Ok(TestHarness {
            manager,
            provider,
            vectors,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete context pipeline backed by test doubles.
pub struct TestHarness {
    pub manager: ContextManager,
    /// The mock LLM provider, for asserting on recorded requests.
    pub provider: Arc<MockProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub config: ParleyConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Builds the context for one turn of `session_id` in the test tenant.
    pub async fn turn(
        &self,
        session_id: &str,
        visitor_id: Option<&str>,
        query: &str,
        history: &[ChatMessage],
    ) -> ContextBundle {
        let mut request =
            ContextRequest::new(query, session_id, TEST_BOT, TEST_TENANT).with_history(history);
        if let Some(visitor_id) = visitor_id {
            request = request.with_visitor(visitor_id);
        }
        self.manager.build_context(request).await
    }

    /// Finalizes `session_id` in the test tenant.
    pub async fn finalize(
        &self,
        session_id: &str,
        conversation: &[ChatMessage],
        outcome: Option<Outcome>,
    ) -> Result<SessionReport, ParleyError> {
        self.manager
            .finalize_session(session_id, TEST_BOT, TEST_TENANT, conversation, outcome)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_harness_builds_a_turn() {
        let harness = TestHarness::builder().build().await.unwrap();
        let bundle = harness.turn("s1", None, "hello", &[]).await;
        assert!(!bundle.degraded);
        assert_eq!(bundle.recent_messages.len(), 1);
        // One extraction call; the default reply is an empty object.
        assert_eq!(harness.provider.request_count().await, 1);
        assert!(bundle.memory.facts.is_empty());
    }

    #[tokio::test]
    async fn sqlite_harness_persists_profiles() {
        let harness = TestHarness::builder().with_sqlite().build().await.unwrap();
        let bundle = harness.turn("s1", Some("v-1"), "hello", &[]).await;
        let profile_id = bundle.memory.profile_link.unwrap();
        assert!(
            harness
                .manager
                .profiles()
                .get_profile(&profile_id)
                .await
                .unwrap()
                .is_some()
        );
    }
}
