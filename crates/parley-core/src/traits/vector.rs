// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector similarity store bound to a single collection.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PayloadFilter, ScoredPoint, VectorPoint};

/// Similarity search over fixed-dimension vectors with JSON payloads.
///
/// The dimensionality is declared once by [`VectorStore::ensure_collection`];
/// vectors of any other length are rejected with
/// [`ParleyError::DimensionMismatch`].
#[async_trait]
pub trait VectorStore: PluginAdapter {
    /// Creates the collection with the given dimensionality if it is missing.
    async fn ensure_collection(&self, dimensions: usize) -> Result<(), ParleyError>;

    /// Inserts or replaces a point by id.
    async fn upsert(&self, point: VectorPoint) -> Result<(), ParleyError>;

    /// Returns up to `limit` points matching `filter` with cosine similarity
    /// of at least `score_threshold`, best first.
    async fn search(
        &self,
        vector: &[f32],
        filter: &PayloadFilter,
        limit: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, ParleyError>;

    /// Lists up to `limit` points matching `filter` without ranking.
    async fn scroll(
        &self,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<VectorPoint>, ParleyError>;

    /// Deletes every point matching `filter`.
    async fn delete_by_filter(&self, filter: &PayloadFilter) -> Result<(), ParleyError>;
}
