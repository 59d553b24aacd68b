// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records shared by session memory, profiles, and history search.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// --- Facts ---

/// A fact value as produced by the extraction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Text(String),
}

impl FactValue {
    /// True for blank text. Numbers are always usable.
    pub fn is_blank(&self) -> bool {
        match self {
            FactValue::Text(s) => s.trim().is_empty(),
            FactValue::Number(n) => !n.is_finite(),
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Text(s) => f.write_str(s),
            FactValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            FactValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Text(s.to_string())
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        FactValue::Text(s)
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactCategory {
    Personal,
    Business,
    Requirements,
    PainPoints,
    Preferences,
    #[default]
    Unknown,
}

/// One extracted fact. Stored under a free-form key in a [`Facts`] map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub value: FactValue,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub category: FactCategory,
    pub extracted_at: DateTime<Utc>,
    /// Set when a later extraction replaced the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Fact {
    pub fn new(value: impl Into<FactValue>, confidence: f64, category: FactCategory) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            category,
            extracted_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Facts keyed by name ("name", "company", "budget", ...).
pub type Facts = BTreeMap<String, Fact>;

/// Fact keys surfaced in prompts and profile views, in display order.
pub const PRIORITY_FACT_KEYS: &[&str] = &[
    "name",
    "company",
    "role",
    "email",
    "phone",
    "industry",
    "company_size",
    "budget",
    "timeline",
    "location",
    "pain_points",
    "requirements",
    "current_solution",
    "decision_maker",
];

// --- Intents ---

/// The fixed intent taxonomy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentKind {
    Greeting,
    Inquiry,
    Pricing,
    Comparison,
    Objection,
    Commitment,
    Scheduling,
    Support,
    Feedback,
    Closing,
}

impl IntentKind {
    pub const ALL: [IntentKind; 10] = [
        IntentKind::Greeting,
        IntentKind::Inquiry,
        IntentKind::Pricing,
        IntentKind::Comparison,
        IntentKind::Objection,
        IntentKind::Commitment,
        IntentKind::Scheduling,
        IntentKind::Support,
        IntentKind::Feedback,
        IntentKind::Closing,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent: IntentKind,
    pub confidence: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl IntentRecord {
    pub fn new(intent: IntentKind, confidence: f64, message: impl Into<String>) -> Self {
        Self {
            intent,
            confidence,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// --- Funnel stages ---

/// Funnel stages in canonical order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FunnelStage {
    #[default]
    Greeting,
    Discovery,
    Solution,
    Pricing,
    ObjectionHandling,
    Closing,
}

impl FunnelStage {
    pub const ALL: [FunnelStage; 6] = [
        FunnelStage::Greeting,
        FunnelStage::Discovery,
        FunnelStage::Solution,
        FunnelStage::Pricing,
        FunnelStage::ObjectionHandling,
        FunnelStage::Closing,
    ];

    /// Position in the canonical order.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: FunnelStage,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Serializable snapshot of a stage tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub current_stage: FunnelStage,
    pub confidence: f64,
    #[serde(default)]
    pub history: Vec<StageRecord>,
    /// Consecutive updates that left the stage unchanged, counting the one that entered it.
    #[serde(default)]
    pub updates_in_stage: u32,
}

// --- Summaries ---

pub const MAX_MAIN_TOPICS: usize = 5;
pub const MAX_USER_NEEDS: usize = 5;
pub const MAX_NEXT_STEPS: usize = 3;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Converted,
    Interested,
    FollowUp,
    NotInterested,
    #[default]
    Unknown,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    /// Numeric value used by running sentiment averages.
    pub fn score(self) -> f64 {
        match self {
            Sentiment::Positive => 1.0,
            Sentiment::Neutral => 0.0,
            Sentiment::Negative => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub short_summary: String,
    pub detailed_summary: String,
    #[serde(default)]
    pub key_facts: BTreeMap<String, String>,
    #[serde(default)]
    pub main_topics: Vec<String>,
    #[serde(default)]
    pub user_needs: Vec<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub sentiment_overall: Sentiment,
    /// Messages covered by this summary; zero for the empty sentinel.
    pub message_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// The sentinel returned when summarization fails.
    pub fn empty() -> Self {
        Self {
            short_summary: String::new(),
            detailed_summary: String::new(),
            key_facts: BTreeMap::new(),
            main_topics: Vec::new(),
            user_needs: Vec::new(),
            outcome: Outcome::Unknown,
            next_steps: Vec::new(),
            sentiment_overall: Sentiment::Neutral,
            message_count: 0,
            generated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message_count == 0 && self.short_summary.is_empty()
    }

    /// Truncates list fields to their caps.
    pub fn enforce_caps(&mut self) {
        self.main_topics.truncate(MAX_MAIN_TOPICS);
        self.user_needs.truncate(MAX_USER_NEEDS);
        self.next_steps.truncate(MAX_NEXT_STEPS);
    }
}

// --- Working memory ---

/// Everything known about one live session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemorySnapshot {
    pub facts: Facts,
    pub intents: Vec<IntentRecord>,
    pub stage: FunnelStage,
    pub stage_confidence: f64,
    pub stage_state: Option<StageState>,
    pub summary: Option<ConversationSummary>,
    pub profile_link: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Profiles ---

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EngagementLevel {
    #[default]
    New,
    Returning,
    Engaged,
    HighlyEngaged,
    Disengaged,
}

impl EngagementLevel {
    /// Derives the level from session count, downgrading persistently unhappy users.
    pub fn derive(total_sessions: u32, average_sentiment: f64) -> Self {
        if average_sentiment < -0.3 && total_sessions > 2 {
            return EngagementLevel::Disengaged;
        }
        match total_sessions {
            10.. => EngagementLevel::HighlyEngaged,
            5..=9 => EngagementLevel::Engaged,
            2..=4 => EngagementLevel::Returning,
            _ => EngagementLevel::New,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorMetrics {
    pub total_sessions: u32,
    pub total_messages: u32,
    pub average_sentiment: f64,
    pub engagement_level: EngagementLevel,
    #[serde(default)]
    pub last_sentiment: Option<Sentiment>,
}

/// A finished session as remembered by a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummaryEntry {
    pub session_id: String,
    pub short_summary: String,
    pub outcome: Outcome,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub topics: Vec<String>,
    pub message_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Durable cross-session identity for one end user of one bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub tenant_id: String,
    pub bot_id: String,
    /// Stored as JSON null when unknown so equality filters can match it.
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Linked anonymous visitor ids; no duplicates.
    #[serde(default)]
    pub visitor_ids: Vec<String>,
    #[serde(default)]
    pub facts: Facts,
    #[serde(default)]
    pub preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub session_summaries: Vec<SessionSummaryEntry>,
    #[serde(default)]
    pub behavior: BehaviorMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, tenant_id: &str, bot_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tenant_id: tenant_id.to_string(),
            bot_id: bot_id.to_string(),
            email: None,
            phone: None,
            visitor_ids: Vec::new(),
            facts: Facts::new(),
            preferences: BTreeMap::new(),
            session_summaries: Vec::new(),
            behavior: BehaviorMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a visitor id if not already linked. Returns true when added.
    pub fn link_visitor(&mut self, visitor_id: &str) -> bool {
        if self.visitor_ids.iter().any(|v| v == visitor_id) {
            return false;
        }
        self.visitor_ids.push(visitor_id.to_string());
        true
    }
}

/// Compact profile view rendered into prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileContext {
    pub profile_id: String,
    pub display_name: Option<String>,
    /// Allow-listed facts in priority order.
    pub facts: Vec<(String, String)>,
    pub total_sessions: u32,
    pub engagement_level: EngagementLevel,
    /// Short summaries of the most recent sessions, oldest first.
    pub recent_sessions: Vec<String>,
}

// --- History ---

/// Payload stored alongside each conversation vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedConversation {
    pub session_id: String,
    pub tenant_id: String,
    pub bot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile_id: Option<String>,
    #[serde(default)]
    pub short_summary: String,
    #[serde(default)]
    pub detailed_summary: String,
    #[serde(default)]
    pub key_facts: BTreeMap<String, String>,
    #[serde(default)]
    pub main_topics: Vec<String>,
    #[serde(default)]
    pub user_needs: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub sentiment_overall: Sentiment,
    #[serde(default)]
    pub message_count: usize,
    pub indexed_at: DateTime<Utc>,
}

/// A semantic search hit over past conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantConversation {
    #[serde(flatten)]
    pub conversation: IndexedConversation,
    pub score: f32,
    /// "Today", "3 days ago", "2 weeks ago", ...
    pub recency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_values_deserialize_untagged() {
        let n: FactValue = serde_json::from_str("5000").unwrap();
        assert_eq!(n, FactValue::Number(5000.0));
        assert_eq!(n.to_string(), "5000");
        let t: FactValue = serde_json::from_str("\"Ahmed\"").unwrap();
        assert_eq!(t, FactValue::Text("Ahmed".into()));
        assert_eq!(FactValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn blank_fact_values() {
        assert!(FactValue::from("  ").is_blank());
        assert!(!FactValue::from("x").is_blank());
        assert!(FactValue::Number(f64::NAN).is_blank());
    }

    #[test]
    fn fact_confidence_is_clamped() {
        assert_eq!(Fact::new("x", 1.7, FactCategory::Personal).confidence, 1.0);
        assert_eq!(Fact::new("x", -0.2, FactCategory::Personal).confidence, 0.0);
    }

    #[test]
    fn enums_use_snake_case_names() {
        assert_eq!(FunnelStage::ObjectionHandling.to_string(), "objection_handling");
        assert_eq!(
            "pain_points".parse::<FactCategory>().unwrap(),
            FactCategory::PainPoints
        );
        assert_eq!(
            serde_json::to_string(&Outcome::FollowUp).unwrap(),
            "\"follow_up\""
        );
        assert_eq!(IntentKind::ALL.len(), 10);
    }

    #[test]
    fn stage_indices_follow_canonical_order() {
        let indices: Vec<usize> = FunnelStage::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn engagement_levels() {
        assert_eq!(EngagementLevel::derive(1, 0.0), EngagementLevel::New);
        assert_eq!(EngagementLevel::derive(2, 0.0), EngagementLevel::Returning);
        assert_eq!(EngagementLevel::derive(5, 0.5), EngagementLevel::Engaged);
        assert_eq!(EngagementLevel::derive(12, 0.0), EngagementLevel::HighlyEngaged);
        assert_eq!(EngagementLevel::derive(3, -0.5), EngagementLevel::Disengaged);
        // Two unhappy sessions are not enough to call it.
        assert_eq!(EngagementLevel::derive(2, -1.0), EngagementLevel::Returning);
    }

    #[test]
    fn empty_summary_sentinel() {
        let s = ConversationSummary::empty();
        assert!(s.is_empty());
        assert_eq!(s.outcome, Outcome::Unknown);
        assert_eq!(s.sentiment_overall, Sentiment::Neutral);
    }

    #[test]
    fn link_visitor_is_idempotent() {
        let mut p = UserProfile::new("p1", "t", "b");
        assert!(p.link_visitor("v1"));
        assert!(!p.link_visitor("v1"));
        assert_eq!(p.visitor_ids, vec!["v1".to_string()]);
    }

    #[test]
    fn profile_serializes_missing_email_as_null() {
        let p = UserProfile::new("p1", "t", "b");
        let json = serde_json::to_value(&p).unwrap();
        assert!(json["email"].is_null());
        assert!(json.as_object().unwrap().contains_key("email"));
    }
}
