// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend wiring from configuration.

use std::sync::Arc;

use parley_anthropic::AnthropicProvider;
use parley_config::model::ParleyConfig;
use parley_context::ContextServices;
use parley_core::{DocumentStore, ParleyError, ProviderAdapter, VectorStore};
use parley_memory::EmbedderFactory;
use parley_storage::{MemoryCache, MemoryDocumentStore, MemoryVectorStore, QdrantVectorStore, SqliteDocumentStore};
use tracing::{info, warn};

/// Opens the configured vector store.
pub fn vector_store(config: &ParleyConfig) -> Result<Arc<dyn VectorStore>, ParleyError> {
    match config.vector.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantVectorStore::connect(&config.vector)?)),
        _ => Ok(Arc::new(MemoryVectorStore::new())),
    }
}

/// Builds every dependency of the context manager.
///
/// A missing API key is not an error: extraction and summaries degrade to
/// empty results instead.
pub async fn connect(config: &ParleyConfig, ephemeral: bool) -> Result<ContextServices, ParleyError> {
    let provider: Option<Arc<dyn ProviderAdapter>> = match AnthropicProvider::new(config) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!(error = %e, "no LLM provider, fact extraction and summaries are disabled");
            None
        }
    };

    let documents: Arc<dyn DocumentStore> = if ephemeral {
        Arc::new(MemoryDocumentStore::new())
    } else {
        Arc::new(SqliteDocumentStore::open(config.storage.clone()).await?)
    };

    let vectors: Arc<dyn VectorStore> = if ephemeral {
        Arc::new(MemoryVectorStore::new())
    } else {
        vector_store(config)?
    };

    info!(
        ephemeral,
        vector_backend = %config.vector.backend,
        llm = provider.is_some(),
        "context services ready"
    );
    Ok(ContextServices {
        provider,
        cache: Some(Arc::new(MemoryCache::new())),
        documents,
        vectors,
        embedder: Arc::new(EmbedderFactory::onnx(config.embedding.model_dir.clone())),
    })
}
