// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable cross-session user profiles.
//!
//! Identity resolution is best-effort and lock-free: two concurrent first
//! contacts for the same identifier can create two profiles. Such duplicates
//! are found by [`ProfileManager::find_duplicate_profiles`] and folded together
//! by [`ProfileManager::reconcile_duplicates`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parley_config::model::ProfileConfig;
use parley_core::types::DocumentFilter;
use parley_core::{DocumentStore, ParleyError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::facts::merge_facts;
use crate::types::{
    BehaviorMetrics, EngagementLevel, Facts, PRIORITY_FACT_KEYS, ProfileContext,
    SessionSummaryEntry, Sentiment, UserProfile,
};

/// Document collection holding profiles.
pub const PROFILES_COLLECTION: &str = "user_profiles";

/// Recent sessions shown in a profile context.
const CONTEXT_SESSIONS: usize = 3;

/// Contact details that may identify a returning user.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identifiers<'a> {
    pub visitor_id: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

pub struct ProfileManager {
    store: Arc<dyn DocumentStore>,
    max_session_summaries: usize,
}

impl ProfileManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: &ProfileConfig) -> Self {
        Self {
            store,
            max_session_summaries: config.max_session_summaries,
        }
    }

    /// Resolves the profile for a contact, creating one when nothing matches.
    ///
    /// Email/phone matches win over visitor matches so a user who identifies
    /// themselves on a new device lands on their existing profile.
    pub async fn get_or_create_profile_by_visitor(
        &self,
        tenant_id: &str,
        bot_id: &str,
        ids: Identifiers<'_>,
    ) -> Result<UserProfile, ParleyError> {
        let email = ids.email.map(normalize_email).filter(|e| !e.is_empty());
        let phone = ids.phone.map(normalize_phone).filter(|p| !p.is_empty());

        let mut found = None;
        if let Some(email) = &email {
            found = self
                .find_one(scope(tenant_id, bot_id).eq("email", email.as_str()))
                .await?;
        }
        if found.is_none()
            && let Some(phone) = &phone
        {
            found = self
                .find_one(scope(tenant_id, bot_id).eq("phone", phone.as_str()))
                .await?;
        }

        if let Some(mut profile) = found {
            let mut changed = ids.visitor_id.is_some_and(|v| profile.link_visitor(v));
            changed |= backfill_contacts(&mut profile, email, phone);
            if changed {
                self.save(&mut profile).await?;
                debug!(profile_id = %profile.id, "linked contact to existing profile");
            }
            return Ok(profile);
        }

        if let Some(visitor_id) = ids.visitor_id
            && let Some(mut profile) = self
                .find_one(scope(tenant_id, bot_id).contains("visitor_ids", visitor_id))
                .await?
        {
            if backfill_contacts(&mut profile, email, phone) {
                self.save(&mut profile).await?;
                debug!(profile_id = %profile.id, "backfilled contact details");
            }
            return Ok(profile);
        }

        let mut profile = UserProfile::new(Uuid::new_v4().to_string(), tenant_id, bot_id);
        profile.email = email;
        profile.phone = phone;
        if let Some(visitor_id) = ids.visitor_id {
            profile.link_visitor(visitor_id);
        }
        self.store
            .insert(PROFILES_COLLECTION, &profile.id, &serde_json::to_value(&profile)?)
            .await?;
        info!(profile_id = %profile.id, tenant_id, bot_id, "created user profile");
        Ok(profile)
    }

    pub async fn get_profile(&self, profile_id: &str) -> Result<Option<UserProfile>, ParleyError> {
        match self.store.find_by_id(PROFILES_COLLECTION, profile_id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn require(&self, profile_id: &str) -> Result<UserProfile, ParleyError> {
        self.get_profile(profile_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound {
                entity: "profile".to_string(),
                id: profile_id.to_string(),
            })
    }

    /// Lists every profile of one tenant's bot, oldest first.
    pub async fn list_profiles(
        &self,
        tenant_id: &str,
        bot_id: &str,
    ) -> Result<Vec<UserProfile>, ParleyError> {
        self.store
            .find_many(PROFILES_COLLECTION, &scope(tenant_id, bot_id))
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(ParleyError::from))
            .collect()
    }

    pub async fn link_visitor(&self, profile_id: &str, visitor_id: &str) -> Result<(), ParleyError> {
        let mut profile = self.require(profile_id).await?;
        if profile.link_visitor(visitor_id) {
            self.save(&mut profile).await?;
        }
        Ok(())
    }

    /// Folds `secondary_id` into `primary_id` and deletes the secondary.
    ///
    /// Irreversible. Primary values win on every key collision.
    pub async fn merge_profiles(
        &self,
        primary_id: &str,
        secondary_id: &str,
    ) -> Result<UserProfile, ParleyError> {
        if primary_id == secondary_id {
            return Err(ParleyError::Internal(
                "cannot merge a profile into itself".to_string(),
            ));
        }
        let mut primary = self.require(primary_id).await?;
        let secondary = self.require(secondary_id).await?;
        if primary.tenant_id != secondary.tenant_id || primary.bot_id != secondary.bot_id {
            return Err(ParleyError::Internal(format!(
                "profiles {primary_id} and {secondary_id} belong to different bots"
            )));
        }

        let mut facts = secondary.facts;
        facts.extend(primary.facts);
        primary.facts = facts;

        let mut preferences = secondary.preferences;
        preferences.extend(primary.preferences);
        primary.preferences = preferences;

        for visitor in &secondary.visitor_ids {
            primary.link_visitor(visitor);
        }
        if primary.email.is_none() {
            primary.email = secondary.email;
        }
        if primary.phone.is_none() {
            primary.phone = secondary.phone;
        }

        primary.session_summaries.extend(secondary.session_summaries);
        primary.session_summaries.sort_by_key(|s| s.timestamp);
        let excess = primary
            .session_summaries
            .len()
            .saturating_sub(self.max_session_summaries);
        primary.session_summaries.drain(..excess);

        let b = &mut primary.behavior;
        b.total_sessions += secondary.behavior.total_sessions;
        b.total_messages += secondary.behavior.total_messages;
        if b.last_sentiment.is_none() {
            b.last_sentiment = secondary.behavior.last_sentiment;
        }
        b.engagement_level = EngagementLevel::derive(b.total_sessions, b.average_sentiment);

        if primary.created_at > secondary.created_at {
            primary.created_at = secondary.created_at;
        }

        self.save(&mut primary).await?;
        self.store.delete(PROFILES_COLLECTION, secondary_id).await?;
        info!(primary_id, secondary_id, "merged user profiles");
        Ok(primary)
    }

    /// Records one finished session's sentiment and message count.
    pub async fn update_behavior_metrics(
        &self,
        profile_id: &str,
        sentiment: Sentiment,
        message_count: usize,
    ) -> Result<BehaviorMetrics, ParleyError> {
        let mut profile = self.require(profile_id).await?;
        let b = &mut profile.behavior;

        let old_count = f64::from(b.total_sessions);
        b.average_sentiment = (b.average_sentiment * old_count + sentiment.score()) / (old_count + 1.0);
        b.total_sessions += 1;
        b.total_messages = b
            .total_messages
            .saturating_add(u32::try_from(message_count).unwrap_or(u32::MAX));
        b.last_sentiment = Some(sentiment);
        b.engagement_level = EngagementLevel::derive(b.total_sessions, b.average_sentiment);

        let metrics = b.clone();
        self.save(&mut profile).await?;
        Ok(metrics)
    }

    /// Appends a session summary, keeping the newest entries.
    pub async fn add_session_summary(
        &self,
        profile_id: &str,
        entry: &SessionSummaryEntry,
    ) -> Result<(), ParleyError> {
        let pushed = self
            .store
            .push_bounded(
                PROFILES_COLLECTION,
                profile_id,
                "session_summaries",
                &serde_json::to_value(entry)?,
                self.max_session_summaries,
            )
            .await?;
        if pushed {
            Ok(())
        } else {
            Err(ParleyError::NotFound {
                entity: "profile".to_string(),
                id: profile_id.to_string(),
            })
        }
    }

    /// Promotes session facts into the profile.
    pub async fn merge_facts(
        &self,
        profile_id: &str,
        facts: &Facts,
        threshold: f64,
    ) -> Result<Facts, ParleyError> {
        let mut profile = self.require(profile_id).await?;
        let merged = merge_facts(&profile.facts, facts, threshold);
        if merged != profile.facts {
            profile.facts = merged.clone();
            self.save(&mut profile).await?;
        }
        Ok(merged)
    }

    pub async fn update_preferences(
        &self,
        profile_id: &str,
        preferences: BTreeMap<String, serde_json::Value>,
    ) -> Result<(), ParleyError> {
        let mut profile = self.require(profile_id).await?;
        profile.preferences.extend(preferences);
        self.save(&mut profile).await
    }

    /// Builds the compact view used in prompts.
    pub async fn get_profile_context(
        &self,
        profile_id: &str,
    ) -> Result<Option<ProfileContext>, ParleyError> {
        Ok(self.get_profile(profile_id).await?.map(|p| profile_context(&p)))
    }

    /// Groups profiles that share an email, phone, or visitor id.
    ///
    /// Each group lists profile ids oldest first; singletons are omitted.
    pub async fn find_duplicate_profiles(
        &self,
        tenant_id: &str,
        bot_id: &str,
    ) -> Result<Vec<Vec<String>>, ParleyError> {
        let profiles = self.list_profiles(tenant_id, bot_id).await?;
        let mut sets = DisjointSet::new(profiles.len());
        let mut owners: HashMap<String, usize> = HashMap::new();

        for (idx, profile) in profiles.iter().enumerate() {
            let keys = profile
                .email
                .iter()
                .map(|e| format!("email:{e}"))
                .chain(profile.phone.iter().map(|p| format!("phone:{p}")))
                .chain(profile.visitor_ids.iter().map(|v| format!("visitor:{v}")));
            for key in keys {
                match owners.get(&key) {
                    Some(&other) => sets.union(other, idx),
                    None => {
                        owners.insert(key, idx);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for idx in 0..profiles.len() {
            groups.entry(sets.find(idx)).or_default().push(idx);
        }

        Ok(groups
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|mut members| {
                members.sort_by_key(|&i| (profiles[i].created_at, i));
                members.into_iter().map(|i| profiles[i].id.clone()).collect()
            })
            .collect())
    }

    /// Merges every duplicate group into its oldest profile. Returns the number of merges.
    pub async fn reconcile_duplicates(
        &self,
        tenant_id: &str,
        bot_id: &str,
    ) -> Result<usize, ParleyError> {
        let mut merged = 0;
        for group in self.find_duplicate_profiles(tenant_id, bot_id).await? {
            let Some((primary, rest)) = group.split_first() else {
                continue;
            };
            for secondary in rest {
                self.merge_profiles(primary, secondary).await?;
                merged += 1;
            }
        }
        if merged > 0 {
            info!(tenant_id, bot_id, merged, "reconciled duplicate profiles");
        }
        Ok(merged)
    }

    async fn find_one(&self, filter: DocumentFilter) -> Result<Option<UserProfile>, ParleyError> {
        match self.store.find_one(PROFILES_COLLECTION, &filter).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, profile: &mut UserProfile) -> Result<(), ParleyError> {
        profile.updated_at = Utc::now();
        let updated = self
            .store
            .update(PROFILES_COLLECTION, &profile.id, &serde_json::to_value(&*profile)?)
            .await?;
        if updated {
            Ok(())
        } else {
            Err(ParleyError::NotFound {
                entity: "profile".to_string(),
                id: profile.id.clone(),
            })
        }
    }
}

fn scope(tenant_id: &str, bot_id: &str) -> DocumentFilter {
    DocumentFilter::new()
        .eq("tenant_id", tenant_id)
        .eq("bot_id", bot_id)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// Fills contact fields that are unset. Never overwrites a known value.
fn backfill_contacts(
    profile: &mut UserProfile,
    email: Option<String>,
    phone: Option<String>,
) -> bool {
    let mut changed = false;
    if profile.email.is_none() && email.is_some() {
        profile.email = email;
        changed = true;
    }
    if profile.phone.is_none() && phone.is_some() {
        profile.phone = phone;
        changed = true;
    }
    changed
}

/// Renders the prompt view of a profile.
pub fn profile_context(profile: &UserProfile) -> ProfileContext {
    let facts = PRIORITY_FACT_KEYS
        .iter()
        .filter_map(|&key| {
            profile
                .facts
                .get(key)
                .map(|f| (key.to_string(), f.value.to_string()))
        })
        .collect();
    let display_name = profile.facts.get("name").map(|f| f.value.to_string());
    let skip = profile
        .session_summaries
        .len()
        .saturating_sub(CONTEXT_SESSIONS);
    let recent_sessions = profile.session_summaries[skip..]
        .iter()
        .filter(|s| !s.short_summary.is_empty())
        .map(|s| s.short_summary.clone())
        .collect();

    ProfileContext {
        profile_id: profile.id.clone(),
        display_name,
        facts,
        total_sessions: profile.behavior.total_sessions,
        engagement_level: profile.behavior.engagement_level,
        recent_sessions,
    }
}

/// Union-find over profile indices.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = rb.min(ra);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fact, FactCategory, Outcome};
    use parley_storage::MemoryDocumentStore;

    fn manager() -> ProfileManager {
        ProfileManager::new(
            Arc::new(MemoryDocumentStore::new()),
            &ProfileConfig::default(),
        )
    }

    fn visitor(v: &str) -> Identifiers<'_> {
        Identifiers {
            visitor_id: Some(v),
            ..Identifiers::default()
        }
    }

    fn entry(session: &str, minutes_ago: i64) -> SessionSummaryEntry {
        SessionSummaryEntry {
            session_id: session.to_string(),
            short_summary: format!("summary {session}"),
            outcome: Outcome::Interested,
            sentiment: Sentiment::Positive,
            topics: vec![],
            message_count: 4,
            timestamp: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn same_visitor_resolves_to_same_profile() {
        let pm = manager();
        let a = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("v1"))
            .await
            .unwrap();
        let b = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("v1"))
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn visitors_are_scoped_per_bot() {
        let pm = manager();
        let a = pm
            .get_or_create_profile_by_visitor("t", "b1", visitor("v1"))
            .await
            .unwrap();
        let b = pm
            .get_or_create_profile_by_visitor("t", "b2", visitor("v1"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn email_match_links_new_device() {
        let pm = manager();
        let laptop = pm
            .get_or_create_profile_by_visitor(
                "t",
                "b",
                Identifiers {
                    visitor_id: Some("laptop"),
                    email: Some("Ahmed@TechCorp.io"),
                    phone: None,
                },
            )
            .await
            .unwrap();
        let phone = pm
            .get_or_create_profile_by_visitor(
                "t",
                "b",
                Identifiers {
                    visitor_id: Some("phone"),
                    email: Some(" ahmed@techcorp.io "),
                    phone: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(laptop.id, phone.id);
        assert_eq!(phone.visitor_ids, vec!["laptop", "phone"]);
    }

    #[tokio::test]
    async fn visitor_match_backfills_but_never_overwrites_contacts() {
        let pm = manager();
        pm.get_or_create_profile_by_visitor("t", "b", visitor("v1"))
            .await
            .unwrap();
        let p = pm
            .get_or_create_profile_by_visitor(
                "t",
                "b",
                Identifiers {
                    visitor_id: Some("v1"),
                    email: None,
                    phone: Some("+1 (555) 010-2000"),
                },
            )
            .await
            .unwrap();
        assert_eq!(p.phone.as_deref(), Some("+15550102000"));

        // A different phone from the same visitor does not replace the known one.
        let p = pm
            .get_or_create_profile_by_visitor(
                "t",
                "b",
                Identifiers {
                    visitor_id: Some("v1"),
                    email: None,
                    phone: Some("+44 20 0000 0000"),
                },
            )
            .await
            .unwrap();
        assert_eq!(p.phone.as_deref(), Some("+15550102000"));
    }

    #[tokio::test]
    async fn behavior_metrics_running_average() {
        let pm = manager();
        let p = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("v"))
            .await
            .unwrap();

        pm.update_behavior_metrics(&p.id, Sentiment::Positive, 6)
            .await
            .unwrap();
        let m = pm
            .update_behavior_metrics(&p.id, Sentiment::Negative, 4)
            .await
            .unwrap();
        assert_eq!(m.total_sessions, 2);
        assert_eq!(m.total_messages, 10);
        assert!(m.average_sentiment.abs() < 1e-9);
        assert_eq!(m.engagement_level, EngagementLevel::Returning);
        assert_eq!(m.last_sentiment, Some(Sentiment::Negative));

        let m = pm
            .update_behavior_metrics(&p.id, Sentiment::Negative, 2)
            .await
            .unwrap();
        // (0 * 2 + -1) / 3 = -0.33 with three sessions.
        assert_eq!(m.engagement_level, EngagementLevel::Disengaged);
    }

    #[tokio::test]
    async fn session_summaries_are_bounded() {
        let pm = ProfileManager::new(
            Arc::new(MemoryDocumentStore::new()),
            &ProfileConfig {
                max_session_summaries: 3,
            },
        );
        let p = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("v"))
            .await
            .unwrap();
        for i in 0..5 {
            pm.add_session_summary(&p.id, &entry(&format!("s{i}"), 10 - i))
                .await
                .unwrap();
        }
        let p = pm.get_profile(&p.id).await.unwrap().unwrap();
        let ids: Vec<_> = p.session_summaries.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3", "s4"]);
    }

    #[tokio::test]
    async fn add_session_summary_to_missing_profile_is_not_found() {
        let err = manager()
            .add_session_summary("ghost", &entry("s", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::NotFound { .. }));
    }

    #[tokio::test]
    async fn merge_prefers_primary_and_sums_counters() {
        let pm = manager();
        let a = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("va"))
            .await
            .unwrap();
        let b = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("vb"))
            .await
            .unwrap();

        let mut fa = Facts::new();
        fa.insert("name".into(), Fact::new("Ahmed", 0.8, FactCategory::Personal));
        pm.merge_facts(&a.id, &fa, 0.7).await.unwrap();
        let mut fb = Facts::new();
        fb.insert("name".into(), Fact::new("Ahmad", 0.95, FactCategory::Personal));
        fb.insert("company".into(), Fact::new("TechCorp", 0.9, FactCategory::Business));
        pm.merge_facts(&b.id, &fb, 0.7).await.unwrap();

        pm.update_behavior_metrics(&a.id, Sentiment::Positive, 5).await.unwrap();
        pm.update_behavior_metrics(&b.id, Sentiment::Negative, 3).await.unwrap();
        pm.update_behavior_metrics(&b.id, Sentiment::Negative, 3).await.unwrap();
        pm.add_session_summary(&b.id, &entry("old", 30)).await.unwrap();
        pm.add_session_summary(&a.id, &entry("new", 1)).await.unwrap();

        let merged = pm.merge_profiles(&a.id, &b.id).await.unwrap();
        assert_eq!(merged.facts["name"].value.to_string(), "Ahmed");
        assert_eq!(merged.facts["company"].value.to_string(), "TechCorp");
        assert_eq!(merged.behavior.total_sessions, 3);
        assert_eq!(merged.behavior.total_messages, 11);
        assert_eq!(merged.behavior.average_sentiment, 1.0);
        assert_eq!(merged.visitor_ids, vec!["va", "vb"]);
        let order: Vec<_> = merged
            .session_summaries
            .iter()
            .map(|s| s.session_id.as_str())
            .collect();
        assert_eq!(order, vec!["old", "new"]);

        assert!(pm.get_profile(&b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merge_rejects_missing_and_self() {
        let pm = manager();
        let a = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("va"))
            .await
            .unwrap();
        assert!(matches!(
            pm.merge_profiles(&a.id, "ghost").await,
            Err(ParleyError::NotFound { .. })
        ));
        assert!(pm.merge_profiles(&a.id, &a.id).await.is_err());
    }

    #[tokio::test]
    async fn duplicates_grouped_by_shared_identifier() {
        let store = Arc::new(MemoryDocumentStore::new());
        let pm = ProfileManager::new(store.clone(), &ProfileConfig::default());

        // Simulate a get-or-create race: two profiles carrying the same visitor.
        let mut first = UserProfile::new("p1", "t", "b");
        first.link_visitor("v1");
        let mut second = UserProfile::new("p2", "t", "b");
        second.link_visitor("v1");
        second.email = Some("x@y.z".into());
        let mut third = UserProfile::new("p3", "t", "b");
        third.email = Some("x@y.z".into());
        let loner = UserProfile::new("p4", "t", "b");
        for p in [&first, &second, &third, &loner] {
            store
                .insert(PROFILES_COLLECTION, &p.id, &serde_json::to_value(p).unwrap())
                .await
                .unwrap();
        }

        let groups = pm.find_duplicate_profiles("t", "b").await.unwrap();
        assert_eq!(groups, vec![vec!["p1".to_string(), "p2".into(), "p3".into()]]);

        assert_eq!(pm.reconcile_duplicates("t", "b").await.unwrap(), 2);
        let survivor = pm.get_profile("p1").await.unwrap().unwrap();
        assert_eq!(survivor.email.as_deref(), Some("x@y.z"));
        assert!(pm.find_duplicate_profiles("t", "b").await.unwrap().is_empty());
        assert_eq!(pm.list_profiles("t", "b").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn profile_context_lists_priority_facts_and_recent_sessions() {
        let pm = manager();
        let p = pm
            .get_or_create_profile_by_visitor("t", "b", visitor("v"))
            .await
            .unwrap();
        let mut facts = Facts::new();
        facts.insert("favorite_color".into(), Fact::new("blue", 0.9, FactCategory::Preferences));
        facts.insert("company".into(), Fact::new("TechCorp", 0.9, FactCategory::Business));
        facts.insert("name".into(), Fact::new("Ahmed", 0.9, FactCategory::Personal));
        pm.merge_facts(&p.id, &facts, 0.7).await.unwrap();
        for i in 0..4 {
            pm.add_session_summary(&p.id, &entry(&format!("s{i}"), 10 - i))
                .await
                .unwrap();
        }

        let ctx = pm.get_profile_context(&p.id).await.unwrap().unwrap();
        assert_eq!(ctx.display_name.as_deref(), Some("Ahmed"));
        assert_eq!(
            ctx.facts,
            vec![
                ("name".to_string(), "Ahmed".to_string()),
                ("company".to_string(), "TechCorp".to_string())
            ]
        );
        assert_eq!(ctx.recent_sessions, vec!["summary s1", "summary s2", "summary s3"]);
        assert!(pm.get_profile_context("ghost").await.unwrap().is_none());
    }
}
