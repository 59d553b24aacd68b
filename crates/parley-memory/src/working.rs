// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session working memory over an expiring hash store.
//!
//! Each session is one hash at `{prefix}:{session_id}`. Every write refreshes
//! the TTL, and so does every read of a live session. Reads never fail: a
//! missing or unreachable store yields an empty snapshot. Writes read first
//! and fail with the read, so an unreachable store never has its fields
//! overwritten from an empty snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_config::model::WorkingMemoryConfig;
use parley_core::{CacheStore, ParleyError};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{
    ConversationSummary, Facts, FunnelStage, IntentRecord, StageState, WorkingMemorySnapshot,
};

const FIELD_FACTS: &str = "facts";
const FIELD_INTENTS: &str = "intents";
const FIELD_STAGE: &str = "stage";
const FIELD_STAGE_CONFIDENCE: &str = "stage_confidence";
const FIELD_STAGE_STATE: &str = "stage_state";
const FIELD_SUMMARY: &str = "summary";
const FIELD_PROFILE_LINK: &str = "profile_link";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_UPDATED_AT: &str = "updated_at";

/// Session memory facade. Cheap to clone.
#[derive(Clone)]
pub struct WorkingMemory {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    max_intents: usize,
    key_prefix: String,
}

impl WorkingMemory {
    pub fn new(store: Option<Arc<dyn CacheStore>>, config: &WorkingMemoryConfig) -> Self {
        if store.is_none() {
            warn!("working memory has no backing store, sessions will not persist");
        }
        Self {
            store,
            ttl: Duration::from_secs(config.ttl_secs),
            max_intents: config.max_intents,
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}:{session_id}", self.key_prefix)
    }

    /// Returns the full snapshot, or defaults when absent or unreadable.
    pub async fn get_all(&self, session_id: &str) -> WorkingMemorySnapshot {
        let Some(store) = &self.store else {
            return WorkingMemorySnapshot::default();
        };
        let key = self.key(session_id);

        let fields = match store.hget_all(&key).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(session_id, error = %e, "working memory read failed, using empty memory");
                return WorkingMemorySnapshot::default();
            }
        };
        if fields.is_empty() {
            return WorkingMemorySnapshot::default();
        }

        if let Err(e) = store.expire(&key, self.ttl).await {
            warn!(session_id, error = %e, "failed to refresh working memory TTL");
        }

        parse_snapshot(session_id, &fields)
    }

    /// Reads the snapshot a mutator builds on. Unlike [`Self::get_all`], a
    /// read failure is returned so the write cannot clobber stored state.
    async fn load(&self, session_id: &str) -> Result<WorkingMemorySnapshot, ParleyError> {
        let Some(store) = &self.store else {
            return Ok(WorkingMemorySnapshot::default());
        };
        let fields = store.hget_all(&self.key(session_id)).await?;
        if fields.is_empty() {
            return Ok(WorkingMemorySnapshot::default());
        }
        Ok(parse_snapshot(session_id, &fields))
    }

    pub async fn get_facts(&self, session_id: &str) -> Facts {
        self.get_all(session_id).await.facts
    }

    pub async fn get_intents(&self, session_id: &str) -> Vec<IntentRecord> {
        self.get_all(session_id).await.intents
    }

    /// Merges `facts` over the stored facts key by key.
    pub async fn update_facts(&self, session_id: &str, facts: &Facts) -> Result<(), ParleyError> {
        let mut current = self.load(session_id).await?;
        current
            .facts
            .extend(facts.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write(
            session_id,
            &current,
            vec![(FIELD_FACTS, serde_json::to_string(&current.facts)?)],
        )
        .await
    }

    /// Appends to the intent log, keeping the newest `max_intents` entries.
    pub async fn add_intent(
        &self,
        session_id: &str,
        record: IntentRecord,
    ) -> Result<(), ParleyError> {
        let mut current = self.load(session_id).await?;
        self.push_intent(&mut current.intents, record);
        self.write(
            session_id,
            &current,
            vec![(FIELD_INTENTS, serde_json::to_string(&current.intents)?)],
        )
        .await
    }

    /// Appends `record` to an in-memory intent log, dropping the oldest
    /// entries beyond `max_intents`.
    pub fn push_intent(&self, intents: &mut Vec<IntentRecord>, record: IntentRecord) {
        intents.push(record);
        if intents.len() > self.max_intents {
            let excess = intents.len() - self.max_intents;
            intents.drain(..excess);
        }
    }

    /// Stores the current stage and the tracker snapshot behind it.
    pub async fn set_stage(&self, session_id: &str, state: &StageState) -> Result<(), ParleyError> {
        let current = self.load(session_id).await?;
        self.write(
            session_id,
            &current,
            vec![
                (FIELD_STAGE, state.current_stage.to_string()),
                (FIELD_STAGE_CONFIDENCE, state.confidence.to_string()),
                (FIELD_STAGE_STATE, serde_json::to_string(state)?),
            ],
        )
        .await
    }

    pub async fn set_summary(
        &self,
        session_id: &str,
        summary: &ConversationSummary,
    ) -> Result<(), ParleyError> {
        let current = self.load(session_id).await?;
        self.write(
            session_id,
            &current,
            vec![(FIELD_SUMMARY, serde_json::to_string(summary)?)],
        )
        .await
    }

    pub async fn set_profile_link(
        &self,
        session_id: &str,
        profile_id: &str,
    ) -> Result<(), ParleyError> {
        let current = self.load(session_id).await?;
        self.write(
            session_id,
            &current,
            vec![(FIELD_PROFILE_LINK, profile_id.to_string())],
        )
        .await
    }

    /// Drops the session. Returns false when nothing was stored.
    pub async fn clear(&self, session_id: &str) -> Result<bool, ParleyError> {
        match &self.store {
            Some(store) => store.delete(&self.key(session_id)).await,
            None => Ok(false),
        }
    }

    /// Lists session ids with live working memory.
    pub async fn active_sessions(&self) -> Result<Vec<String>, ParleyError> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}:", self.key_prefix);
        let mut sessions: Vec<String> = store
            .scan(&format!("{prefix}*"))
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        sessions.sort();
        Ok(sessions)
    }

    async fn write(
        &self,
        session_id: &str,
        current: &WorkingMemorySnapshot,
        fields: Vec<(&str, String)>,
    ) -> Result<(), ParleyError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let key = self.key(session_id);
        let now = Utc::now().to_rfc3339();

        let mut owned: Vec<(String, String)> = fields
            .into_iter()
            .map(|(f, v)| (f.to_string(), v))
            .collect();
        if current.created_at.is_none() {
            owned.push((FIELD_CREATED_AT.to_string(), now.clone()));
        }
        owned.push((FIELD_UPDATED_AT.to_string(), now));

        store.hset(&key, &owned).await?;
        store.expire(&key, self.ttl).await?;
        debug!(session_id, fields = owned.len(), "working memory updated");
        Ok(())
    }
}

fn parse_snapshot(session_id: &str, fields: &HashMap<String, String>) -> WorkingMemorySnapshot {
    WorkingMemorySnapshot {
        facts: parse_json(session_id, fields, FIELD_FACTS).unwrap_or_default(),
        intents: parse_json(session_id, fields, FIELD_INTENTS).unwrap_or_default(),
        stage: fields
            .get(FIELD_STAGE)
            .and_then(|s| s.parse::<FunnelStage>().ok())
            .unwrap_or_default(),
        stage_confidence: fields
            .get(FIELD_STAGE_CONFIDENCE)
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or_default(),
        stage_state: parse_json(session_id, fields, FIELD_STAGE_STATE),
        summary: parse_json(session_id, fields, FIELD_SUMMARY),
        profile_link: fields
            .get(FIELD_PROFILE_LINK)
            .filter(|s| !s.is_empty())
            .cloned(),
        created_at: parse_time(fields.get(FIELD_CREATED_AT)),
        updated_at: parse_time(fields.get(FIELD_UPDATED_AT)),
    }
}

fn parse_json<T: DeserializeOwned>(
    session_id: &str,
    fields: &HashMap<String, String>,
    field: &str,
) -> Option<T> {
    let raw = fields.get(field)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(session_id, field, error = %e, "discarding corrupt working memory field");
            None
        }
    }
}

fn parse_time(raw: Option<&String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fact, FactCategory, IntentKind};
    use parley_core::{AdapterType, HealthStatus, PluginAdapter};
    use parley_storage::MemoryCache;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing_test::traced_test;

    /// Cache whose hash reads can be switched to fail.
    #[derive(Default)]
    struct FlakyCache {
        inner: MemoryCache,
        fail_reads: AtomicBool,
    }

    #[async_trait::async_trait]
    impl PluginAdapter for FlakyCache {
        fn name(&self) -> &str {
            "flaky-cache"
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
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl CacheStore for FlakyCache {
        async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
            self.inner.get(key).await
        }
        async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ParleyError> {
            self.inner.set_ex(key, value, ttl).await
        }
        async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(ParleyError::storage("connection reset"));
            }
            self.inner.hget_all(key).await
        }
        async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
            self.inner.hset(key, fields).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
            self.inner.expire(key, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
            self.inner.delete(key).await
        }
        async fn scan(&self, pattern: &str) -> Result<Vec<String>, ParleyError> {
            self.inner.scan(pattern).await
        }
    }

    fn memory() -> WorkingMemory {
        WorkingMemory::new(
            Some(Arc::new(MemoryCache::new())),
            &WorkingMemoryConfig::default(),
        )
    }

    #[tokio::test]
    async fn missing_session_yields_defaults() {
        let snapshot = memory().get_all("nope").await;
        assert_eq!(snapshot, WorkingMemorySnapshot::default());
    }

    #[tokio::test]
    async fn no_store_degrades_to_defaults() {
        let wm = WorkingMemory::new(None, &WorkingMemoryConfig::default());
        wm.set_profile_link("s1", "p1").await.unwrap();
        assert_eq!(wm.get_all("s1").await, WorkingMemorySnapshot::default());
        assert!(wm.active_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_write_stamps_created_at_once() {
        let wm = memory();
        wm.set_profile_link("s1", "p1").await.unwrap();
        let first = wm.get_all("s1").await;
        let created = first.created_at.unwrap();

        wm.set_profile_link("s1", "p2").await.unwrap();
        let second = wm.get_all("s1").await;
        assert_eq!(second.created_at.unwrap(), created);
        assert_eq!(second.profile_link.as_deref(), Some("p2"));
        assert!(second.updated_at.unwrap() >= first.updated_at.unwrap());
    }

    #[tokio::test]
    async fn facts_and_stage_round_trip() {
        let wm = memory();
        let mut facts = Facts::new();
        facts.insert(
            "name".into(),
            Fact::new("Ahmed", 0.95, FactCategory::Personal),
        );
        wm.update_facts("s1", &facts).await.unwrap();

        let state = StageState {
            current_stage: FunnelStage::Pricing,
            confidence: 0.8,
            history: Vec::new(),
            updates_in_stage: 2,
        };
        wm.set_stage("s1", &state).await.unwrap();

        let snapshot = wm.get_all("s1").await;
        assert_eq!(snapshot.facts, facts);
        assert_eq!(snapshot.stage, FunnelStage::Pricing);
        assert_eq!(snapshot.stage_confidence, 0.8);
        assert_eq!(snapshot.stage_state, Some(state));
    }

    #[tokio::test]
    async fn update_facts_keeps_unrelated_keys() {
        let wm = memory();
        let mut first = Facts::new();
        first.insert("name".into(), Fact::new("Ahmed", 0.9, FactCategory::Personal));
        wm.update_facts("s1", &first).await.unwrap();

        let mut second = Facts::new();
        second.insert(
            "company".into(),
            Fact::new("TechCorp", 0.9, FactCategory::Business),
        );
        wm.update_facts("s1", &second).await.unwrap();

        let facts = wm.get_facts("s1").await;
        assert_eq!(facts.len(), 2);
    }

    #[tokio::test]
    async fn clear_and_active_sessions() {
        let wm = memory();
        wm.set_profile_link("b", "p").await.unwrap();
        wm.set_profile_link("a", "p").await.unwrap();
        assert_eq!(wm.active_sessions().await.unwrap(), vec!["a", "b"]);

        assert!(wm.clear("a").await.unwrap());
        assert!(!wm.clear("a").await.unwrap());
        assert_eq!(wm.active_sessions().await.unwrap(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn session_expires_after_ttl() {
        let config = WorkingMemoryConfig {
            ttl_secs: 60,
            ..WorkingMemoryConfig::default()
        };
        let wm = WorkingMemory::new(Some(Arc::new(MemoryCache::new())), &config);
        wm.set_profile_link("s1", "p1").await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        // Reading refreshes the TTL.
        assert!(wm.get_all("s1").await.profile_link.is_some());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(wm.get_all("s1").await.profile_link.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(wm.get_all("s1").await.profile_link.is_none());
    }

    #[tokio::test]
    async fn intent_log_is_capped_to_newest() {
        let wm = memory();
        for i in 0..25 {
            wm.add_intent("s1", IntentRecord::new(IntentKind::Inquiry, 0.5, format!("m{i}")))
                .await
                .unwrap();
        }
        let intents = wm.get_intents("s1").await;
        assert_eq!(intents.len(), 20);
        assert_eq!(intents.first().unwrap().message, "m5");
        assert_eq!(intents.last().unwrap().message, "m24");
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_read_never_overwrites_stored_state() {
        let cache = Arc::new(FlakyCache::default());
        let wm = WorkingMemory::new(Some(cache.clone()), &WorkingMemoryConfig::default());
        let mut facts = Facts::new();
        facts.insert("name".into(), Fact::new("Ahmed", 0.9, FactCategory::Personal));
        wm.update_facts("s1", &facts).await.unwrap();
        for i in 0..3 {
            wm.add_intent("s1", IntentRecord::new(IntentKind::Pricing, 0.7, format!("m{i}")))
                .await
                .unwrap();
        }

        cache.fail_reads.store(true, Ordering::SeqCst);
        assert_eq!(wm.get_all("s1").await, WorkingMemorySnapshot::default());
        assert!(logs_contain("working memory read failed"));

        let record = IntentRecord::new(IntentKind::Objection, 0.6, "too expensive");
        assert!(wm.add_intent("s1", record).await.is_err());
        let mut extra = Facts::new();
        extra.insert("company".into(), Fact::new("TechCorp", 0.9, FactCategory::Business));
        assert!(wm.update_facts("s1", &extra).await.is_err());

        cache.fail_reads.store(false, Ordering::SeqCst);
        let snapshot = wm.get_all("s1").await;
        assert_eq!(snapshot.intents.len(), 3);
        assert_eq!(snapshot.facts, facts);
    }

    #[test]
    fn push_intent_keeps_newest_within_cap() {
        let config = WorkingMemoryConfig {
            max_intents: 3,
            ..WorkingMemoryConfig::default()
        };
        let wm = WorkingMemory::new(None, &config);
        let mut log = Vec::new();
        for i in 0..5 {
            wm.push_intent(&mut log, IntentRecord::new(IntentKind::Inquiry, 0.5, i.to_string()));
        }
        let messages: Vec<&str> = log.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["2", "3", "4"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]
        #[test]
        fn intent_log_matches_most_recent_calls(count in 0usize..45) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let wm = memory();
                for i in 0..count {
                    wm.add_intent("s", IntentRecord::new(IntentKind::Pricing, 0.6, i.to_string()))
                        .await
                        .unwrap();
                }
                let messages: Vec<String> =
                    wm.get_intents("s").await.into_iter().map(|r| r.message).collect();
                let expected: Vec<String> =
                    (count.saturating_sub(20)..count).map(|i| i.to_string()).collect();
                assert_eq!(messages, expected);
            });
        }
    }
}
