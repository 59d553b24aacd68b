// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic bag-of-words embedder.
//!
//! Each word is hashed into one of `dimensions` buckets and the counts are
//! L2-normalized, so texts that share words have positive cosine similarity
//! and texts with disjoint vocabularies score near zero.

use async_trait::async_trait;

use parley_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use parley_core::{EmbeddingAdapter, ParleyError, PluginAdapter};

pub struct MockEmbedder {
    dimensions: usize,
    failing: bool,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            failing: false,
        }
    }

    /// An embedder whose every call fails.
    pub fn failing(dimensions: usize) -> Self {
        Self {
            dimensions,
            failing: true,
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let words = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        for word in &words {
            // FNV-1a
            let hash = word
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
            v[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(if self.failing {
            HealthStatus::Unhealthy("mock embedder is failing".to_string())
        } else {
            HealthStatus::Healthy
        })
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, ParleyError> {
        if self.failing {
            return Err(ParleyError::embedding("mock embedder is failing"));
        }
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.vector(t)).collect(),
            dimensions: self.dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn identical_text_is_identical_vector() {
        let e = MockEmbedder::new(384);
        let v = e.vector("CRM pricing for fifty seats");
        assert_eq!(v, e.vector("crm pricing, for fifty seats"));
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_raise_similarity() {
        let e = MockEmbedder::new(384);
        let base = e.vector("crm pricing seats");
        let near = e.vector("crm pricing discount");
        let far = e.vector("weather forecast tomorrow");
        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[tokio::test]
    async fn failing_embedder_errors() {
        let e = MockEmbedder::failing(8);
        assert!(e.embed_one("x").await.is_err());
    }
}
