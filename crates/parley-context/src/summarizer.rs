// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Threshold-triggered conversation summaries, with rolling updates.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use parley_config::model::SummarizerConfig;
use parley_core::types::{ChatMessage, ProviderRequest, Role};
use parley_core::ProviderAdapter;
use parley_memory::{ConversationSummary, Facts, IntentRecord, Outcome, Sentiment};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::llm::{as_text, complete_json};

const SUMMARY_SCHEMA: &str = "Respond with a JSON object with these fields:
short_summary (one sentence), detailed_summary (one paragraph), key_facts (object of string values),
main_topics (up to 5 strings), user_needs (up to 5 strings),
outcome (one of converted, interested, follow_up, not_interested, unknown),
next_steps (up to 3 strings), sentiment_overall (one of positive, neutral, negative).";

/// Which summarization path produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// First summary over the whole transcript.
    Full,
    /// Update of a prior summary from the messages since.
    Rolling,
    /// End-of-session summary.
    Final,
}

impl SummaryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryKind::Full => "full",
            SummaryKind::Rolling => "rolling",
            SummaryKind::Final => "final",
        }
    }
}

pub struct ConversationSummarizer {
    provider: Option<Arc<dyn ProviderAdapter>>,
    model: String,
    config: SummarizerConfig,
}

impl ConversationSummarizer {
    pub fn new(
        provider: Option<Arc<dyn ProviderAdapter>>,
        default_model: &str,
        config: SummarizerConfig,
    ) -> Self {
        let model = config.model.clone().unwrap_or_else(|| default_model.to_string());
        Self {
            provider,
            model,
            config,
        }
    }

    /// Decides whether a transcript of `message_count` messages needs a
    /// new summary given the one already held.
    pub fn due(&self, message_count: usize, prior: Option<&ConversationSummary>) -> Option<SummaryKind> {
        if message_count < self.config.threshold {
            return None;
        }
        match prior.filter(|p| !p.is_empty()) {
            None => Some(SummaryKind::Full),
            Some(p) => {
                let step = (self.config.threshold / 2).max(1);
                (message_count >= p.message_count + step).then_some(SummaryKind::Rolling)
            }
        }
    }

    /// Summarizes when due, otherwise hands back `prior` unchanged.
    ///
    /// A failed summarization yields [`ConversationSummary::empty`].
    pub async fn process_conversation(
        &self,
        messages: &[ChatMessage],
        facts: &Facts,
        intents: &[IntentRecord],
        prior: Option<&ConversationSummary>,
    ) -> Option<ConversationSummary> {
        let kind = match self.due(messages.len(), prior) {
            Some(kind) => kind,
            None => return prior.cloned(),
        };

        let prompt = match (kind, prior) {
            (SummaryKind::Rolling, Some(prior)) => {
                let new_messages = &messages[prior.message_count.min(messages.len())..];
                rolling_prompt(prior, new_messages, facts)
            }
            _ => full_prompt(messages, facts, intents),
        };
        Some(self.generate(kind, prompt, messages.len()).await)
    }

    /// End-of-session summary over the whole transcript, regardless of
    /// thresholds.
    pub async fn final_summary(
        &self,
        messages: &[ChatMessage],
        facts: &Facts,
        intents: &[IntentRecord],
    ) -> ConversationSummary {
        if messages.is_empty() {
            return ConversationSummary::empty();
        }
        self.generate(SummaryKind::Final, full_prompt(messages, facts, intents), messages.len())
            .await
    }

    async fn generate(&self, kind: SummaryKind, prompt: String, message_count: usize) -> ConversationSummary {
        let request = ProviderRequest::single(&self.model, prompt, self.config.max_tokens)
            .with_system(format!(
                "You summarize sales and support conversations for a chatbot's memory.\n{SUMMARY_SCHEMA}"
            ))
            .with_temperature(0.3);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        match complete_json(self.provider.as_ref(), request, timeout).await {
            Ok(object) => {
                let mut summary = validate_summary(object);
                summary.message_count = message_count;
                summary.generated_at = Utc::now();
                counter!("parley_summaries_generated_total", "kind" => kind.as_str()).increment(1);
                info!(kind = kind.as_str(), message_count, "conversation summarized");
                summary
            }
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "summarization failed, substituting empty summary");
                ConversationSummary::empty()
            }
        }
    }
}

fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn facts_block(facts: &Facts) -> String {
    if facts.is_empty() {
        return "none".to_string();
    }
    facts
        .iter()
        .map(|(key, fact)| format!("{key}: {}", fact.value))
        .collect::<Vec<_>>()
        .join("; ")
}

fn full_prompt(messages: &[ChatMessage], facts: &Facts, intents: &[IntentRecord]) -> String {
    let mut seen = Vec::new();
    for record in intents {
        let label = record.intent.to_string();
        if !seen.contains(&label) {
            seen.push(label);
        }
    }
    let intents = if seen.is_empty() { "none".to_string() } else { seen.join(", ") };
    format!(
        "Known facts: {}\nObserved intents: {intents}\n\nConversation:\n{}",
        facts_block(facts),
        transcript(messages)
    )
}

fn rolling_prompt(prior: &ConversationSummary, new_messages: &[ChatMessage], facts: &Facts) -> String {
    let prior_json = serde_json::to_string(prior).unwrap_or_default();
    format!(
        "Update this existing summary with the new messages. Keep what is still true.\n\nExisting summary:\n{prior_json}\n\nKnown facts: {}\n\nNew messages:\n{}",
        facts_block(facts),
        transcript(new_messages)
    )
}

/// Coerces a model-produced summary object into a [`ConversationSummary`].
///
/// Lists are truncated to their caps and out-of-range enum values fall back
/// to their defaults. `message_count` and `generated_at` are read when
/// present so a stored summary passes through unchanged.
pub fn validate_summary(object: Map<String, Value>) -> ConversationSummary {
    let text = |field: &str| object.get(field).and_then(as_text).unwrap_or_default();

    let list = |field: &str| -> Vec<String> {
        match object.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(as_text)
                .filter(|s| !s.is_empty())
                .collect(),
            Some(other) => as_text(other).filter(|s| !s.is_empty()).into_iter().collect(),
            None => Vec::new(),
        }
    };

    let key_facts: BTreeMap<String, String> = match object.get("key_facts") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| {
                let rendered = match v {
                    Value::Array(items) => {
                        items.iter().filter_map(as_text).collect::<Vec<_>>().join(", ")
                    }
                    other => as_text(other)?,
                };
                (!rendered.is_empty()).then(|| (k.clone(), rendered))
            })
            .collect(),
        _ => BTreeMap::new(),
    };

    let outcome = object
        .get("outcome")
        .and_then(as_text)
        .and_then(|s| Outcome::from_str(&s.to_lowercase()).ok())
        .unwrap_or_default();
    let sentiment_overall = object
        .get("sentiment_overall")
        .and_then(as_text)
        .and_then(|s| Sentiment::from_str(&s.to_lowercase()).ok())
        .unwrap_or_default();

    let message_count = object
        .get("message_count")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(0);
    let generated_at = object
        .get("generated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut summary = ConversationSummary {
        short_summary: text("short_summary"),
        detailed_summary: text("detailed_summary"),
        key_facts,
        main_topics: list("main_topics"),
        user_needs: list("user_needs"),
        outcome,
        next_steps: list("next_steps"),
        sentiment_overall,
        message_count,
        generated_at,
    };
    summary.enforce_caps();
    debug!(topics = summary.main_topics.len(), "summary validated");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use parley_memory::IntentKind;
    use serde_json::json;
    use tracing_test::traced_test;

    const SUMMARY_JSON: &str = r#"{
        "short_summary": "Ahmed from TechCorp asked about pricing.",
        "detailed_summary": "Ahmed wants a CRM for 50 seats and asked about the premium plan.",
        "key_facts": {"company": "TechCorp", "seats": 50},
        "main_topics": ["pricing", "crm"],
        "user_needs": ["crm"],
        "outcome": "interested",
        "next_steps": ["send quote"],
        "sentiment_overall": "positive"
    }"#;

    fn conversation(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("user {i}"))
                } else {
                    ChatMessage::assistant(format!("bot {i}"))
                }
            })
            .collect()
    }

    fn summarizer(provider: Arc<ScriptedProvider>) -> ConversationSummarizer {
        ConversationSummarizer::new(Some(provider), "test-model", SummarizerConfig::default())
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn full_then_rolling_at_thresholds() {
        let provider = ScriptedProvider::new().reply(SUMMARY_JSON).reply(SUMMARY_JSON).shared();
        let summarizer = summarizer(provider.clone());
        let facts = Facts::new();

        let none = summarizer.process_conversation(&conversation(19), &facts, &[], None).await;
        assert!(none.is_none());
        assert!(provider.requests().is_empty());

        let first = summarizer
            .process_conversation(&conversation(20), &facts, &[], None)
            .await
            .unwrap();
        assert_eq!(first.message_count, 20);
        assert_eq!(first.outcome, Outcome::Interested);
        assert!(provider.requests()[0].messages[0].content.contains("Conversation:"));

        let unchanged = summarizer
            .process_conversation(&conversation(29), &facts, &[], Some(&first))
            .await;
        assert_eq!(unchanged.as_ref(), Some(&first));
        assert_eq!(provider.requests().len(), 1);

        let rolled = summarizer
            .process_conversation(&conversation(30), &facts, &[], Some(&first))
            .await
            .unwrap();
        assert_eq!(rolled.message_count, 30);
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let rolling_prompt = &requests[1].messages[0].content;
        assert!(rolling_prompt.contains("Existing summary:"));
        assert!(rolling_prompt.contains("user 20"));
        assert!(!rolling_prompt.contains("user 18"));
    }

    #[test]
    fn empty_prior_counts_as_no_summary() {
        let summarizer = ConversationSummarizer::new(None, "m", SummarizerConfig::default());
        let sentinel = ConversationSummary::empty();
        assert_eq!(summarizer.due(22, Some(&sentinel)), Some(SummaryKind::Full));
        assert_eq!(summarizer.due(5, None), None);
    }

    #[tokio::test]
    #[traced_test]
    async fn failure_yields_empty_sentinel() {
        let provider = ScriptedProvider::new().fail("overloaded").shared();
        let summary = summarizer(provider)
            .process_conversation(&conversation(20), &Facts::new(), &[], None)
            .await
            .unwrap();
        assert!(summary.is_empty());
        assert_eq!(summary.sentiment_overall, Sentiment::Neutral);
        assert_eq!(summary.outcome, Outcome::Unknown);
        assert!(logs_contain("summarization failed"));
    }

    #[tokio::test]
    async fn final_summary_ignores_threshold() {
        let provider = ScriptedProvider::new().reply(SUMMARY_JSON).shared();
        let intents = [IntentRecord::new(IntentKind::Pricing, 0.8, "price?")];
        let summary = summarizer(provider.clone())
            .final_summary(&conversation(4), &Facts::new(), &intents)
            .await;
        assert_eq!(summary.message_count, 4);
        assert!(provider.requests()[0].messages[0].content.contains("Observed intents: pricing"));

        let empty = summarizer(provider).final_summary(&[], &Facts::new(), &[]).await;
        assert!(empty.is_empty());
    }

    #[test]
    fn validation_coerces_and_caps() {
        let summary = validate_summary(object(json!({
            "short_summary": "s",
            "main_topics": ["a", "b", "c", "d", "e", "f", "g"],
            "user_needs": "one need",
            "next_steps": ["1", "2", "3", "4"],
            "outcome": "ecstatic",
            "sentiment_overall": "NEGATIVE",
            "key_facts": {"seats": 50, "tools": ["slack", "jira"], "empty": null}
        })));
        assert_eq!(summary.main_topics.len(), 5);
        assert_eq!(summary.user_needs, vec!["one need"]);
        assert_eq!(summary.next_steps.len(), 3);
        assert_eq!(summary.outcome, Outcome::Unknown);
        assert_eq!(summary.sentiment_overall, Sentiment::Negative);
        assert_eq!(summary.key_facts["seats"], "50");
        assert_eq!(summary.key_facts["tools"], "slack, jira");
        assert!(!summary.key_facts.contains_key("empty"));
        assert_eq!(summary.detailed_summary, "");
    }

    #[test]
    fn validation_is_idempotent_on_valid_summaries() {
        let mut valid = validate_summary(object(serde_json::from_str(SUMMARY_JSON).unwrap()));
        valid.message_count = 24;

        let again = validate_summary(object(serde_json::to_value(&valid).unwrap()));
        assert_eq!(again, valid);
    }
}
