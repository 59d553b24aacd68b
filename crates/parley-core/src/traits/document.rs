// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document store for durable JSON records.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::DocumentFilter;

/// Stores JSON object documents grouped by collection and addressed by id.
#[async_trait]
pub trait DocumentStore: PluginAdapter {
    /// Inserts a new document. Fails if the id already exists.
    async fn insert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), ParleyError>;

    /// Fetches a document by id.
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, ParleyError>;

    /// Returns the oldest document matching `filter`.
    async fn find_one(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>, ParleyError>;

    /// Returns every document matching `filter`, oldest first.
    async fn find_many(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Value>, ParleyError>;

    /// Replaces a document. Returns false when the id does not exist.
    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<bool, ParleyError>;

    /// Appends `item` to the array `field`, keeping only the newest `cap` items.
    ///
    /// Returns false when the document does not exist.
    async fn push_bounded(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: &Value,
        cap: usize,
    ) -> Result<bool, ParleyError>;

    /// Deletes a document. Returns false when the id did not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, ParleyError>;
}
