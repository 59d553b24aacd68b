// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the DocumentStore trait.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::types::DocumentFilter;
use parley_core::{AdapterType, DocumentStore, HealthStatus, ParleyError, PluginAdapter};

use crate::database::Database;
use crate::queries::documents;

/// SQLite-backed document store.
///
/// The database is opened lazily by [`SqliteDocumentStore::initialize`].
pub struct SqliteDocumentStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteDocumentStore {
    /// Creates a store; no connection is opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Opens the database and runs migrations.
    pub async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| ParleyError::storage("document store already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite document store initialized");
        Ok(())
    }

    /// Convenience constructor that initializes immediately.
    pub async fn open(config: StorageConfig) -> Result<Self, ParleyError> {
        let store = Self::new(config);
        store.initialize().await?;
        Ok(store)
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db
            .get()
            .ok_or_else(|| ParleyError::storage("document store not initialized"))
    }
}

#[async_trait]
impl PluginAdapter for SqliteDocumentStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::DocumentStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, collection: &str, id: &str, doc: &Value) -> Result<(), ParleyError> {
        documents::insert(self.db()?, collection, id, doc).await
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, ParleyError> {
        documents::find_by_id(self.db()?, collection, id).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>, ParleyError> {
        let mut docs = documents::find(self.db()?, collection, filter, Some(1)).await?;
        Ok(docs.pop())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Vec<Value>, ParleyError> {
        documents::find(self.db()?, collection, filter, None).await
    }

    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<bool, ParleyError> {
        documents::update(self.db()?, collection, id, doc).await
    }

    async fn push_bounded(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        item: &Value,
        cap: usize,
    ) -> Result<bool, ParleyError> {
        documents::push_bounded(self.db()?, collection, id, field, item, cap).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, ParleyError> {
        documents::delete(self.db()?, collection, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> (tempfile::TempDir, SqliteDocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("docs.db").display().to_string(),
            wal_mode: true,
        };
        let store = SqliteDocumentStore::open(config).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn uninitialized_store_errors() {
        let store = SqliteDocumentStore::new(StorageConfig::default());
        assert!(store.find_by_id("profiles", "x").await.is_err());
        assert_eq!(
            store.health_check().await.unwrap(),
            HealthStatus::Unhealthy("not initialized".to_string())
        );
    }

    #[tokio::test]
    async fn insert_find_update_delete() {
        let (_dir, store) = store().await;
        let doc = json!({"id": "p1", "tenant_id": "t1", "email": "a@example.com"});

        store.insert("profiles", "p1", &doc).await.unwrap();
        assert!(store.insert("profiles", "p1", &doc).await.is_err());
        assert_eq!(store.find_by_id("profiles", "p1").await.unwrap(), Some(doc));
        assert_eq!(store.find_by_id("other", "p1").await.unwrap(), None);

        let updated = json!({"id": "p1", "tenant_id": "t1", "email": "b@example.com"});
        assert!(store.update("profiles", "p1", &updated).await.unwrap());
        assert!(!store.update("profiles", "missing", &updated).await.unwrap());

        assert!(store.delete("profiles", "p1").await.unwrap());
        assert!(!store.delete("profiles", "p1").await.unwrap());
        assert_eq!(store.find_by_id("profiles", "p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn filters_on_equality_and_array_membership() {
        let (_dir, store) = store().await;
        store
            .insert(
                "profiles",
                "p1",
                &json!({"tenant_id": "t1", "bot_id": "b1", "visitor_ids": ["v1", "v2"]}),
            )
            .await
            .unwrap();
        store
            .insert(
                "profiles",
                "p2",
                &json!({"tenant_id": "t1", "bot_id": "b2", "visitor_ids": ["v2"], "phone": "555"}),
            )
            .await
            .unwrap();

        let by_visitor = DocumentFilter::new()
            .eq("tenant_id", "t1")
            .eq("bot_id", "b1")
            .contains("visitor_ids", "v2");
        let found = store.find_one("profiles", &by_visitor).await.unwrap().unwrap();
        assert_eq!(found["bot_id"], "b1");

        let all_v2 = DocumentFilter::new().contains("visitor_ids", "v2");
        assert_eq!(store.find_many("profiles", &all_v2).await.unwrap().len(), 2);

        let by_phone = DocumentFilter::new().eq("phone", "555");
        assert_eq!(store.find_many("profiles", &by_phone).await.unwrap().len(), 1);

        let none = DocumentFilter::new().contains("visitor_ids", "v9");
        assert!(store.find_one("profiles", &none).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_bounded_truncates_to_newest() {
        let (_dir, store) = store().await;
        store
            .insert("profiles", "p1", &json!({"session_summaries": []}))
            .await
            .unwrap();

        for i in 0..5 {
            assert!(
                store
                    .push_bounded("profiles", "p1", "session_summaries", &json!(i), 3)
                    .await
                    .unwrap()
            );
        }
        let doc = store.find_by_id("profiles", "p1").await.unwrap().unwrap();
        assert_eq!(doc["session_summaries"], json!([2, 3, 4]));

        assert!(
            !store
                .push_bounded("profiles", "nope", "session_summaries", &json!(1), 3)
                .await
                .unwrap()
        );
    }
}
