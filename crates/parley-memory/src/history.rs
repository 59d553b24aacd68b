// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic search over summaries of finished conversations.
//!
//! Each finalized session is one vector whose id is derived from
//! tenant/bot/session, so re-indexing a session replaces its entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_config::model::HistoryConfig;
use parley_core::types::{PayloadFilter, VectorPoint};
use parley_core::{ParleyError, VectorStore};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::factory::EmbedderFactory;
use crate::types::{ConversationSummary, IndexedConversation, RelevantConversation};

/// Upper bound on points read when listing one profile's history.
const MAX_HISTORY_SCAN: usize = 1000;

pub struct SemanticHistorySearch {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<EmbedderFactory>,
    config: HistoryConfig,
    collection_ready: OnceCell<()>,
}

impl SemanticHistorySearch {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<EmbedderFactory>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            config,
            collection_ready: OnceCell::new(),
        }
    }

    async fn ensure_collection(&self) -> Result<(), ParleyError> {
        self.collection_ready
            .get_or_try_init(|| async {
                self.vectors
                    .ensure_collection(self.config.embedding_dimensions)
                    .await
            })
            .await
            .map(|_| ())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ParleyError> {
        let embedder = self.embedder.get().await?;
        let vector = embedder.embed_one(text).await?;
        if vector.len() != self.config.embedding_dimensions {
            return Err(ParleyError::DimensionMismatch {
                expected: self.config.embedding_dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Indexes a finished conversation and returns its vector id.
    ///
    /// Indexing is best-effort: embedding or store failures are logged and
    /// yield `Ok(None)`. A dimension mismatch is a configuration fault and is
    /// returned as an error.
    pub async fn index_conversation(
        &self,
        tenant_id: &str,
        bot_id: &str,
        session_id: &str,
        summary: &ConversationSummary,
        profile_id: Option<&str>,
    ) -> Result<Option<String>, ParleyError> {
        let text = search_text(summary);
        if text.trim().is_empty() {
            debug!(session_id, "skipping index of empty summary");
            return Ok(None);
        }

        let result: Result<String, ParleyError> = async {
            self.ensure_collection().await?;
            let vector = self.embed(&text).await?;

            let record = IndexedConversation {
                session_id: session_id.to_string(),
                tenant_id: tenant_id.to_string(),
                bot_id: bot_id.to_string(),
                user_profile_id: profile_id.map(str::to_string),
                short_summary: summary.short_summary.clone(),
                detailed_summary: summary.detailed_summary.clone(),
                key_facts: summary.key_facts.clone(),
                main_topics: summary.main_topics.clone(),
                user_needs: summary.user_needs.clone(),
                next_steps: summary.next_steps.clone(),
                outcome: summary.outcome,
                sentiment_overall: summary.sentiment_overall,
                message_count: summary.message_count,
                indexed_at: Utc::now(),
            };
            let serde_json::Value::Object(payload) = serde_json::to_value(&record)? else {
                return Err(ParleyError::Internal(
                    "conversation payload is not an object".to_string(),
                ));
            };

            let id = vector_id(tenant_id, bot_id, session_id);
            self.vectors
                .upsert(VectorPoint {
                    id: id.clone(),
                    vector,
                    payload,
                })
                .await?;
            Ok(id)
        }
        .await;

        match result {
            Ok(id) => {
                metrics::counter!("parley_conversations_indexed_total").increment(1);
                info!(session_id, vector_id = %id, "conversation indexed");
                Ok(Some(id))
            }
            Err(e @ ParleyError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                warn!(session_id, error = %e, "conversation indexing failed, skipping");
                Ok(None)
            }
        }
    }

    /// Finds past conversations similar to `query` using the configured limits.
    pub async fn search_relevant_conversations(
        &self,
        tenant_id: &str,
        bot_id: &str,
        query: &str,
        profile_id: Option<&str>,
    ) -> Result<Vec<RelevantConversation>, ParleyError> {
        self.search_with_limits(
            tenant_id,
            bot_id,
            query,
            profile_id,
            self.config.top_k,
            self.config.min_score,
        )
        .await
    }

    /// Returns at most `top_k` hits scoring at least `min_score`, best first.
    pub async fn search_with_limits(
        &self,
        tenant_id: &str,
        bot_id: &str,
        query: &str,
        profile_id: Option<&str>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RelevantConversation>, ParleyError> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_collection().await?;
        let vector = self.embed(query).await?;

        let mut filter = scope(tenant_id, bot_id);
        if let Some(profile_id) = profile_id {
            filter = filter.matches("user_profile_id", profile_id);
        }

        let hits = self
            .vectors
            .search(&vector, &filter, top_k, min_score)
            .await?;

        let now = Utc::now();
        let mut results: Vec<RelevantConversation> = hits
            .into_iter()
            .filter(|hit| hit.score >= min_score)
            .filter_map(|hit| {
                match serde_json::from_value::<IndexedConversation>(serde_json::Value::Object(
                    hit.payload,
                )) {
                    Ok(conversation) => Some(RelevantConversation {
                        recency: recency_label(conversation.indexed_at, now),
                        conversation,
                        score: hit.score,
                    }),
                    Err(e) => {
                        warn!(vector_id = %hit.id, error = %e, "skipping malformed history payload");
                        None
                    }
                }
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    /// Lists one profile's indexed conversations, newest first.
    pub async fn get_user_conversation_history(
        &self,
        tenant_id: &str,
        bot_id: &str,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<IndexedConversation>, ParleyError> {
        self.ensure_collection().await?;
        let filter = scope(tenant_id, bot_id).matches("user_profile_id", profile_id);
        let points = self.vectors.scroll(&filter, MAX_HISTORY_SCAN).await?;

        let mut conversations: Vec<IndexedConversation> = points
            .into_iter()
            .filter_map(|p| serde_json::from_value(serde_json::Value::Object(p.payload)).ok())
            .filter(|c: &IndexedConversation| c.user_profile_id.as_deref() == Some(profile_id))
            .collect();
        conversations.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
        conversations.truncate(limit);
        Ok(conversations)
    }

    pub async fn delete_conversation(
        &self,
        tenant_id: &str,
        bot_id: &str,
        session_id: &str,
    ) -> Result<(), ParleyError> {
        self.ensure_collection().await?;
        self.vectors
            .delete_by_filter(&scope(tenant_id, bot_id).matches("session_id", session_id))
            .await
    }

    pub async fn delete_profile_history(
        &self,
        tenant_id: &str,
        bot_id: &str,
        profile_id: &str,
    ) -> Result<(), ParleyError> {
        self.ensure_collection().await?;
        self.vectors
            .delete_by_filter(&scope(tenant_id, bot_id).matches("user_profile_id", profile_id))
            .await
    }
}

fn scope(tenant_id: &str, bot_id: &str) -> PayloadFilter {
    PayloadFilter::new()
        .matches("tenant_id", tenant_id)
        .matches("bot_id", bot_id)
}

/// Deterministic point id for one session.
pub fn vector_id(tenant_id: &str, bot_id: &str, session_id: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{tenant_id}/{bot_id}/{session_id}").as_bytes(),
    )
    .to_string()
}

/// Text embedded for a summary.
pub fn search_text(summary: &ConversationSummary) -> String {
    let mut parts = Vec::new();
    for text in [&summary.short_summary, &summary.detailed_summary] {
        if !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    if !summary.key_facts.is_empty() {
        let facts: Vec<String> = summary
            .key_facts
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        parts.push(format!("Key facts: {}", facts.join(", ")));
    }
    if !summary.main_topics.is_empty() {
        parts.push(format!("Topics: {}", summary.main_topics.join(", ")));
    }
    if !summary.user_needs.is_empty() {
        parts.push(format!("Needs: {}", summary.user_needs.join(", ")));
    }
    parts.join("\n")
}

/// Human-readable age of an indexed conversation.
pub fn recency_label(indexed_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - indexed_at).num_days().max(0);
    let (n, unit) = match days {
        0 => return "Today".to_string(),
        1..=6 => (days, "day"),
        7..=29 => (days / 7, "week"),
        _ => (days / 30, "month"),
    };
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
