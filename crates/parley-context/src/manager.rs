// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn context orchestration.
//!
//! [`ContextManager::build_context`] loads session memory, runs fact
//! extraction, intent detection, profile linking, and history search
//! concurrently, then derives the funnel stage and summary from their
//! results. Every subtask degrades to a safe default on failure, so a turn
//! always produces a [`ContextBundle`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use parley_config::ParleyConfig;
use parley_config::model::ContextConfig;
use parley_core::types::ChatMessage;
use parley_core::{CacheStore, DocumentStore, ParleyError, ProviderAdapter, VectorStore};
use parley_memory::profile::profile_context;
use parley_memory::{
    ConversationSummary, EmbedderFactory, Facts, FunnelStage, Identifiers, IntentKind, IntentRecord,
    Outcome, ProfileContext, ProfileManager, RelevantConversation, SemanticHistorySearch,
    SessionSummaryEntry, StageState, UserProfile, WorkingMemory, WorkingMemorySnapshot,
};
use tracing::{debug, info, warn};

use crate::extractor::FactExtractor;
use crate::intent::{IntentDetector, IntentResult, IntentTracker};
use crate::prompt::{build_prompt_context, summary_text, PromptInputs};
use crate::stage::{stage_guidance, StageDetector};
use crate::summarizer::ConversationSummarizer;
use crate::tables::{DefaultFunnelTables, IntentProgression, IntentStageMap};

/// Guidance used when no stage could be determined.
pub const FALLBACK_GUIDANCE: &str = "Be helpful and professional";

/// Backends the manager runs against.
pub struct ContextServices {
    /// `None` disables LLM-backed extraction and summarization.
    pub provider: Option<Arc<dyn ProviderAdapter>>,
    /// `None` runs with empty, unpersisted working memory.
    pub cache: Option<Arc<dyn CacheStore>>,
    pub documents: Arc<dyn DocumentStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<EmbedderFactory>,
}

/// One incoming user message and who sent it.
#[derive(Debug, Clone, Copy)]
pub struct ContextRequest<'a> {
    pub query: &'a str,
    pub session_id: &'a str,
    pub bot_id: &'a str,
    pub tenant_id: &'a str,
    /// Turns before `query`, oldest first.
    pub conversation_history: &'a [ChatMessage],
    pub visitor_id: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

impl<'a> ContextRequest<'a> {
    pub fn new(query: &'a str, session_id: &'a str, bot_id: &'a str, tenant_id: &'a str) -> Self {
        Self {
            query,
            session_id,
            bot_id,
            tenant_id,
            conversation_history: &[],
            visitor_id: None,
            email: None,
            phone: None,
        }
    }

    pub fn with_history(mut self, history: &'a [ChatMessage]) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_visitor(mut self, visitor_id: &'a str) -> Self {
        self.visitor_id = Some(visitor_id);
        self
    }

    pub fn with_contact(mut self, email: Option<&'a str>, phone: Option<&'a str>) -> Self {
        self.email = email;
        self.phone = phone;
        self
    }

    fn identifiers(&self) -> Identifiers<'a> {
        Identifiers {
            visitor_id: self.visitor_id,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// Everything the response layer needs for one turn.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    /// Trailing window of the conversation, including the current query.
    pub recent_messages: Vec<ChatMessage>,
    pub memory: WorkingMemorySnapshot,
    pub profile: Option<ProfileContext>,
    pub summary: Option<String>,
    pub relevant_conversations: Vec<RelevantConversation>,
    pub prompt_context: String,
    pub stage_guidance: String,
    pub stage: FunnelStage,
    /// `None` when intent detection did not contribute this turn.
    pub intent: Option<IntentKind>,
    pub secondary_intent: Option<IntentKind>,
    pub dominant_intent: Option<IntentKind>,
    pub predicted_intent: Option<IntentKind>,
    pub build_time_ms: u64,
    /// Set on the minimal bundle returned after a failed build.
    pub degraded: bool,
}

/// What [`ContextManager::finalize_session`] did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub summary: ConversationSummary,
    pub vector_id: Option<String>,
    pub profile_id: Option<String>,
}

pub struct ContextManager {
    memory: WorkingMemory,
    profiles: ProfileManager,
    history: SemanticHistorySearch,
    extractor: FactExtractor,
    detector: IntentDetector,
    summarizer: ConversationSummarizer,
    stage_map: Arc<dyn IntentStageMap>,
    progression: Arc<dyn IntentProgression>,
    config: ContextConfig,
}

impl ContextManager {
    /// Wires the pipeline with the default funnel tables.
    pub fn new(services: ContextServices, config: &ParleyConfig) -> Self {
        let default_model = config.anthropic.default_model.as_str();
        let tables = Arc::new(DefaultFunnelTables);
        Self {
            memory: WorkingMemory::new(services.cache, &config.working_memory),
            profiles: ProfileManager::new(services.documents, &config.profiles),
            history: SemanticHistorySearch::new(
                services.vectors,
                services.embedder,
                config.history.clone(),
            ),
            extractor: FactExtractor::new(
                services.provider.clone(),
                default_model,
                config.extraction.clone(),
            ),
            detector: IntentDetector::new(),
            summarizer: ConversationSummarizer::new(
                services.provider,
                default_model,
                config.summarizer.clone(),
            ),
            stage_map: tables.clone(),
            progression: tables,
            config: config.context.clone(),
        }
    }

    /// Replaces the intent-to-stage and intent progression heuristics.
    pub fn with_funnel_tables(
        mut self,
        stage_map: Arc<dyn IntentStageMap>,
        progression: Arc<dyn IntentProgression>,
    ) -> Self {
        self.stage_map = stage_map;
        self.progression = progression;
        self
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.memory
    }

    pub fn profiles(&self) -> &ProfileManager {
        &self.profiles
    }

    pub fn history(&self) -> &SemanticHistorySearch {
        &self.history
    }

    /// Builds the context for one turn. Never fails.
    pub async fn build_context(&self, request: ContextRequest<'_>) -> ContextBundle {
        let started = Instant::now();
        counter!("parley_context_builds_total").increment(1);

        let mut bundle = match self.try_build(&request).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(
                    session_id = request.session_id,
                    error = %e,
                    "context build failed, returning fallback bundle"
                );
                self.fallback_bundle(&request)
            }
        };

        let elapsed = started.elapsed();
        bundle.build_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        histogram!("parley_context_build_seconds").record(elapsed.as_secs_f64());

        let budget = Duration::from_millis(self.config.latency_budget_ms);
        if elapsed > budget {
            counter!("parley_context_budget_exceeded_total").increment(1);
            warn!(
                session_id = request.session_id,
                build_time_ms = bundle.build_time_ms,
                budget_ms = self.config.latency_budget_ms,
                "context build exceeded latency budget"
            );
        }
        bundle
    }

    async fn try_build(&self, request: &ContextRequest<'_>) -> Result<ContextBundle, ParleyError> {
        for (field, value) in [
            ("session_id", request.session_id),
            ("bot_id", request.bot_id),
            ("tenant_id", request.tenant_id),
        ] {
            if value.trim().is_empty() {
                return Err(ParleyError::Internal(format!("{field} is empty")));
            }
        }

        // 1. Load session memory.
        let snapshot = self.memory.get_all(request.session_id).await;
        let mut conversation = request.conversation_history.to_vec();
        conversation.push(ChatMessage::user(request.query));

        // 2. Fan out the independent subtasks and wait for all of them. History
        // search is scoped to the resolved profile, so it follows linking.
        let (extracted, intent, (linked, relevant)) = tokio::join!(
            async { Ok::<_, ParleyError>(self.extractor.extract(request.query, &snapshot.facts).await) },
            async {
                Ok::<_, ParleyError>(self.detector.detect(
                    request.query,
                    request.conversation_history,
                    Some(snapshot.stage),
                ))
            },
            self.link_and_search(request, snapshot.profile_link.as_deref()),
        );

        let new_facts = settle(request.session_id, "extract_facts", extracted, Facts::new);
        let intent: Option<IntentResult> = settle(request.session_id, "detect_intent", intent.map(Some), || None);
        let profile: Option<UserProfile> = settle(request.session_id, "link_profile", linked, || None);
        let relevant = settle(request.session_id, "search_history", relevant, Vec::new);

        // 3. Fold the results into session state.
        let facts = self.extractor.merge(&snapshot.facts, &new_facts);
        let mut intents = snapshot.intents.clone();
        let record = intent
            .as_ref()
            .map(|r| IntentRecord::new(r.intent, r.confidence, request.query));
        if let Some(record) = record.clone() {
            self.memory.push_intent(&mut intents, record);
        }

        // 4. Stage detection depends on the intent log.
        let mut stages = StageDetector::from_state(
            snapshot.stage_state.clone().unwrap_or_else(|| StageState {
                current_stage: snapshot.stage,
                confidence: snapshot.stage_confidence,
                ..Default::default()
            }),
            self.stage_map.clone(),
        );
        let (stage, stage_confidence) = stages.detect(&conversation, &intents, &facts);
        stages.update_stage(stage, stage_confidence);

        // 5. Summarize once the conversation is long enough.
        let prior = snapshot.summary.clone().filter(|s| !s.is_empty());
        let produced = self
            .summarizer
            .process_conversation(&conversation, &facts, &intents, prior.as_ref())
            .await
            .filter(|s| !s.is_empty());
        let summary_changed = produced.is_some() && produced != prior;
        let summary = produced.or(prior);

        // 6. Persist. Failures leave this turn's view intact.
        let profile_id = profile.as_ref().map(|p| p.id.clone());
        self.persist(
            request.session_id,
            Some(&facts).filter(|f| **f != snapshot.facts),
            record,
            &stages,
            summary.as_ref().filter(|_| summary_changed),
            profile_id.as_deref().filter(|id| snapshot.profile_link.as_deref() != Some(*id)),
        )
        .await;

        // 7. Assemble the bundle.
        let profile_view = profile.as_ref().map(profile_context);
        let stage_state = stages.to_state();
        let memory = WorkingMemorySnapshot {
            facts,
            intents,
            stage: stage_state.current_stage,
            stage_confidence: stage_state.confidence,
            stage_state: Some(stage_state),
            summary,
            profile_link: profile_id.or(snapshot.profile_link),
            created_at: snapshot.created_at.or_else(|| Some(Utc::now())),
            updated_at: Some(Utc::now()),
        };

        let prompt_context = build_prompt_context(
            &PromptInputs {
                profile: profile_view.as_ref(),
                stage: memory.stage,
                stage_confidence: memory.stage_confidence,
                intents: &memory.intents,
                facts: &memory.facts,
                summary: memory.summary.as_ref(),
                relevant: &relevant,
            },
            self.config.max_chars,
        );

        let tracker = IntentTracker::with_records(memory.intents.clone(), self.progression.clone());
        debug!(
            session_id = request.session_id,
            stage = %memory.stage,
            facts = memory.facts.len(),
            relevant = relevant.len(),
            "context assembled"
        );

        Ok(ContextBundle {
            recent_messages: tail(&conversation, self.config.recent_messages),
            profile: profile_view,
            summary: memory.summary.as_ref().and_then(summary_text),
            relevant_conversations: relevant,
            prompt_context,
            stage_guidance: stage_guidance(memory.stage).to_string(),
            stage: memory.stage,
            intent: intent.as_ref().map(|r| r.intent),
            secondary_intent: intent.and_then(|r| r.secondary_intent),
            dominant_intent: tracker.get_dominant_intent(),
            predicted_intent: tracker.predict_next_intent(),
            build_time_ms: 0,
            degraded: false,
            memory,
        })
    }

    /// Links the profile, then searches that profile's past conversations.
    ///
    /// Without a profile there is no search: summaries of other visitors of
    /// the same bot never reach this session's prompt.
    async fn link_and_search(
        &self,
        request: &ContextRequest<'_>,
        stored_link: Option<&str>,
    ) -> (
        Result<Option<UserProfile>, ParleyError>,
        Result<Vec<RelevantConversation>, ParleyError>,
    ) {
        let linked = self.link_profile(request, stored_link).await;
        let scope = match &linked {
            Ok(Some(profile)) => Some(profile.id.clone()),
            _ => stored_link.map(str::to_string),
        };
        let Some(profile_id) = scope else {
            debug!(session_id = request.session_id, "no profile linked, skipping history search");
            return (linked, Ok(Vec::new()));
        };
        let relevant = self
            .history
            .search_relevant_conversations(request.tenant_id, request.bot_id, request.query, Some(&profile_id))
            .await;
        (linked, relevant)
    }

    /// Resolves the session's profile from the stored link or the request's
    /// identifiers.
    async fn link_profile(
        &self,
        request: &ContextRequest<'_>,
        linked: Option<&str>,
    ) -> Result<Option<UserProfile>, ParleyError> {
        if let Some(id) = linked
            && let Some(profile) = self.profiles.get_profile(id).await?
        {
            return Ok(Some(profile));
        }

        let ids = request.identifiers();
        if ids.visitor_id.is_none() && ids.email.is_none() && ids.phone.is_none() {
            return Ok(None);
        }
        self.profiles
            .get_or_create_profile_by_visitor(request.tenant_id, request.bot_id, ids)
            .await
            .map(Some)
    }

    async fn persist(
        &self,
        session_id: &str,
        facts: Option<&Facts>,
        intent: Option<IntentRecord>,
        stages: &StageDetector,
        summary: Option<&ConversationSummary>,
        profile_link: Option<&str>,
    ) {
        // Sequential: each write is a read-modify-write of the same record.
        let mut results = Vec::new();
        if let Some(facts) = facts {
            results.push(("facts", self.memory.update_facts(session_id, facts).await));
        }
        if let Some(record) = intent {
            results.push(("intent", self.memory.add_intent(session_id, record).await));
        }
        results.push(("stage", self.memory.set_stage(session_id, &stages.to_state()).await));
        if let Some(summary) = summary {
            results.push(("summary", self.memory.set_summary(session_id, summary).await));
        }
        if let Some(profile_id) = profile_link {
            results.push(("profile_link", self.memory.set_profile_link(session_id, profile_id).await));
        }

        for (field, result) in results {
            if let Err(e) = result {
                counter!("parley_context_subtask_failures_total", "task" => "persist").increment(1);
                warn!(session_id, field, error = %e, "failed to persist working memory");
            }
        }
    }

    /// The minimal bundle: recent messages, empty memory, generic guidance.
    pub fn fallback_bundle(&self, request: &ContextRequest<'_>) -> ContextBundle {
        let mut conversation = request.conversation_history.to_vec();
        conversation.push(ChatMessage::user(request.query));
        ContextBundle {
            recent_messages: tail(&conversation, self.config.recent_messages),
            memory: WorkingMemorySnapshot::default(),
            profile: None,
            summary: None,
            relevant_conversations: Vec::new(),
            prompt_context: String::new(),
            stage_guidance: FALLBACK_GUIDANCE.to_string(),
            stage: FunnelStage::Greeting,
            intent: None,
            secondary_intent: None,
            dominant_intent: None,
            predicted_intent: None,
            build_time_ms: 0,
            degraded: true,
        }
    }

    /// Closes out a session: final summary, history index, and, when a
    /// profile is linked, the profile's session log, behavior metrics, and
    /// facts.
    ///
    /// `outcome` overrides the summarized outcome. Only a vector dimension
    /// mismatch is returned as an error; everything else degrades.
    pub async fn finalize_session(
        &self,
        session_id: &str,
        bot_id: &str,
        tenant_id: &str,
        conversation: &[ChatMessage],
        outcome: Option<Outcome>,
    ) -> Result<SessionReport, ParleyError> {
        let snapshot = self.memory.get_all(session_id).await;

        let mut summary = self
            .summarizer
            .final_summary(conversation, &snapshot.facts, &snapshot.intents)
            .await;
        if summary.is_empty()
            && let Some(prior) = snapshot.summary.clone().filter(|s| !s.is_empty())
        {
            summary = prior;
        }
        if let Some(outcome) = outcome {
            summary.outcome = outcome;
        }

        let profile_id = snapshot.profile_link.clone();
        let vector_id = self
            .history
            .index_conversation(tenant_id, bot_id, session_id, &summary, profile_id.as_deref())
            .await?;

        if let Some(profile_id) = &profile_id {
            self.update_profile(profile_id, session_id, &summary, conversation.len(), &snapshot.facts)
                .await;
        }

        info!(
            session_id,
            tenant_id,
            indexed = vector_id.is_some(),
            profile_linked = profile_id.is_some(),
            "session finalized"
        );
        Ok(SessionReport {
            summary,
            vector_id,
            profile_id,
        })
    }

    async fn update_profile(
        &self,
        profile_id: &str,
        session_id: &str,
        summary: &ConversationSummary,
        message_count: usize,
        facts: &Facts,
    ) {
        let entry = SessionSummaryEntry {
            session_id: session_id.to_string(),
            short_summary: summary.short_summary.clone(),
            outcome: summary.outcome,
            sentiment: summary.sentiment_overall,
            topics: summary.main_topics.clone(),
            message_count,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.profiles.add_session_summary(profile_id, &entry).await {
            warn!(profile_id, session_id, error = %e, "failed to record session summary on profile");
        }
        if let Err(e) = self
            .profiles
            .update_behavior_metrics(profile_id, summary.sentiment_overall, message_count)
            .await
        {
            warn!(profile_id, session_id, error = %e, "failed to update behavior metrics");
        }
        if !facts.is_empty()
            && let Err(e) = self
                .profiles
                .merge_facts(profile_id, facts, self.extractor.merge_threshold())
                .await
        {
            warn!(profile_id, session_id, error = %e, "failed to promote session facts");
        }
    }
}

/// Substitutes `default` for a failed subtask, logging and counting it.
fn settle<T>(
    session_id: &str,
    task: &'static str,
    result: Result<T, ParleyError>,
    default: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            counter!("parley_context_subtask_failures_total", "task" => task).increment(1);
            warn!(session_id, task, error = %e, "context subtask failed, using default");
            default()
        }
    }
}

fn tail(messages: &[ChatMessage], n: usize) -> Vec<ChatMessage> {
    messages[messages.len().saturating_sub(n)..].to_vec()
}
