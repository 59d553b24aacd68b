// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process expiring key-value store.
//!
//! Keys hold either a string or a string hash. Expiry is checked lazily on
//! access against `tokio::time::Instant`, so paused-clock tests can advance
//! time deterministically. Expired keys that are never read again are
//! dropped by a sweep on every `scan` and every [`SWEEP_EVERY_WRITES`] writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use parley_core::{AdapterType, CacheStore, HealthStatus, ParleyError, PluginAdapter};
use tracing::debug;

/// Writes between two full sweeps of expired entries.
pub const SWEEP_EVERY_WRITES: u64 = 256;

#[derive(Debug, Clone)]
enum CacheValue {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Concurrent in-process cache implementing [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "swept expired cache entries");
        }
        purged
    }

    fn note_write(&self) {
        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_WRITES == 0 {
            self.purge_expired();
        }
    }

    /// Drops `key` if it has expired. Returns true when a live entry remains.
    fn evict_if_expired(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
        self.entries.contains_key(key)
    }
}

fn wrong_type(key: &str) -> ParleyError {
    ParleyError::storage(format!("WRONGTYPE operation against key `{key}` holding the wrong kind of value"))
}

/// Glob match where `*` matches any (possibly empty) run of characters.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

#[async_trait]
impl PluginAdapter for MemoryCache {
    fn name(&self) -> &str {
        "memory-cache"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Cache
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.entries.clear();
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        if !self.evict_if_expired(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(CacheValue::Text(s)) => Ok(Some(s)),
            Some(CacheValue::Hash(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ParleyError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: CacheValue::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        self.note_write();
        Ok(())
    }

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError> {
        if !self.evict_if_expired(key) {
            return Ok(HashMap::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(CacheValue::Hash(h)) => Ok(h),
            Some(CacheValue::Text(_)) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
        self.evict_if_expired(key);
        self.note_write();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: CacheValue::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            CacheValue::Hash(hash) => {
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                Ok(())
            }
            CacheValue::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        if !self.evict_if_expired(key) {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
        self.purge_expired();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
