// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Adapter for generating fixed-length vector embeddings from text.
///
/// Output must be deterministic for the same model version.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Length of every vector this adapter produces.
    fn dimensions(&self) -> usize;

    /// Generates one embedding per input text.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ParleyError>;

    /// Convenience wrapper embedding a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ParleyError> {
        let output = self
            .embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
            .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::embedding("embedder returned no vectors"))
    }
}
