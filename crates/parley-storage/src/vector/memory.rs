// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Brute-force cosine VectorStore held in process memory.

use std::sync::OnceLock;

use async_trait::async_trait;
use dashmap::DashMap;

use parley_core::types::{PayloadFilter, ScoredPoint, VectorPoint};
use parley_core::{AdapterType, HealthStatus, ParleyError, PluginAdapter, VectorStore};

use super::cosine_similarity;

/// Exhaustive-scan vector store. Suitable for tests and small deployments.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    dimensions: OnceLock<usize>,
    points: DashMap<String, VectorPoint>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), ParleyError> {
        let expected = *self
            .dimensions
            .get()
            .ok_or_else(|| ParleyError::vector_store("collection has not been created"))?;
        if expected != actual {
            return Err(ParleyError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for MemoryVectorStore {
    fn name(&self) -> &str {
        "memory-vectors"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::VectorStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), ParleyError> {
        let declared = *self.dimensions.get_or_init(|| dimensions);
        if declared != dimensions {
            return Err(ParleyError::DimensionMismatch {
                expected: declared,
                actual: dimensions,
            });
        }
        Ok(())
    }

    async fn upsert(&self, point: VectorPoint) -> Result<(), ParleyError> {
        self.check_dimensions(point.vector.len())?;
        self.points.insert(point.id.clone(), point);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &PayloadFilter,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, ParleyError> {
        self.check_dimensions(vector.len())?;

        let mut hits: Vec<ScoredPoint> = self
            .points
            .iter()
            .filter(|p| filter.accepts(&p.payload))
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<VectorPoint>, ParleyError> {
        let mut points: Vec<VectorPoint> = self
            .points
            .iter()
            .filter(|p| filter.accepts(&p.payload))
            .map(|p| p.value().clone())
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        points.truncate(limit);
        Ok(points)
    }

    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), ParleyError> {
        self.points.retain(|_, p| !filter.accepts(&p.payload));
        Ok(())
    }
}
