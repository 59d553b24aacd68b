// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazily-initialized, process-shared embedding adapter.
//!
//! The first caller builds the embedder; concurrent callers wait on the same
//! initialization. A failed initialization is not cached, so the next caller
//! retries.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use parley_core::{EmbeddingAdapter, ParleyError};
use tokio::sync::OnceCell;
use tracing::info;

use crate::embedder::OnnxEmbedder;
use crate::model_manager::ModelManager;

type InitFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn EmbeddingAdapter>, ParleyError>> + Send>>;
type InitFn = dyn Fn() -> InitFuture + Send + Sync;

pub struct EmbedderFactory {
    cell: OnceCell<Arc<dyn EmbeddingAdapter>>,
    init: Box<InitFn>,
}

impl EmbedderFactory {
    /// Builds the embedder on first use with `init`.
    pub fn from_fn<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn EmbeddingAdapter>, ParleyError>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Box::new(move || Box::pin(init())),
        }
    }

    /// Wraps an embedder that is already loaded.
    pub fn ready(embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(embedder)),
            init: Box::new(|| {
                Box::pin(async {
                    Err(ParleyError::Internal(
                        "pre-initialized embedder factory cannot re-initialize".to_string(),
                    ))
                })
            }),
        }
    }

    /// Downloads (if needed) and loads the local ONNX model on first use.
    pub fn onnx(model_dir: Option<String>) -> Self {
        Self::from_fn(move || {
            let manager = ModelManager::from_config(model_dir.as_deref());
            async move {
                let model_path: PathBuf = manager.ensure_model().await?;
                let embedder = tokio::task::spawn_blocking(move || OnnxEmbedder::load(&model_path))
                    .await
                    .map_err(|e| ParleyError::Internal(format!("embedder load task failed: {e}")))??;
                info!("ONNX embedder initialized");
                Ok(Arc::new(embedder) as Arc<dyn EmbeddingAdapter>)
            }
        })
    }

    /// Returns the shared embedder, initializing it if needed.
    pub async fn get(&self) -> Result<Arc<dyn EmbeddingAdapter>, ParleyError> {
        self.cell
            .get_or_try_init(|| (self.init)())
            .await
            .map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
    use parley_core::PluginAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Constant;

    #[async_trait]
    impl PluginAdapter for Constant {
        fn name(&self) -> &str {
            "constant"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Embedding
        }
        async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EmbeddingAdapter for Constant {
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ParleyError> {
            Ok(EmbeddingOutput {
                embeddings: input.texts.iter().map(|_| vec![1.0, 0.0]).collect(),
                dimensions: 2,
            })
        }
    }

    #[tokio::test]
    async fn initializes_once_across_concurrent_callers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = Arc::new(EmbedderFactory::from_fn(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Arc::new(Constant) as Arc<dyn EmbeddingAdapter>)
            }
        }));

        let (a, b) = tokio::join!(factory.get(), factory.get());
        assert!(a.is_ok() && b.is_ok());
        factory.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(factory.is_initialized());
    }

    #[tokio::test]
    async fn failed_initialization_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let factory = EmbedderFactory::from_fn(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(ParleyError::embedding("model download failed"))
                } else {
                    Ok(Arc::new(Constant) as Arc<dyn EmbeddingAdapter>)
                }
            }
        });

        assert!(factory.get().await.is_err());
        assert!(!factory.is_initialized());
        let embedder = factory.get().await.unwrap();
        assert_eq!(embedder.embed_one("x").await.unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn ready_factory_returns_given_embedder() {
        let factory = EmbedderFactory::ready(Arc::new(Constant));
        assert!(factory.is_initialized());
        assert_eq!(factory.get().await.unwrap().dimensions(), 2);
    }
}
