// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key-value store with per-key expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;

/// Expiring key-value store holding plain string values and string hashes.
///
/// Semantics follow the usual cache-server model: a key holds either a
/// string or a hash, expiry applies to the whole key, and reading an
/// expired key behaves as if it never existed.
#[async_trait]
pub trait CacheStore: PluginAdapter {
    /// Returns the string stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Stores a string at `key` that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ParleyError>;

    /// Returns every field of the hash at `key` (empty when absent).
    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError>;

    /// Sets the given fields on the hash at `key`, creating it if needed.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError>;

    /// Resets the expiry of `key`. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError>;

    /// Deletes `key`. Returns false when the key did not exist.
    async fn delete(&self, key: &str) -> Result<bool, ParleyError>;

    /// Lists live keys matching a glob pattern where `*` matches any run of characters.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError>;
}
