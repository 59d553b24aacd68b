// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-backed fact extraction from user messages.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parley_config::model::ExtractionConfig;
use parley_core::types::{ChatMessage, ProviderRequest};
use parley_core::ProviderAdapter;
use parley_memory::{merge_facts, Fact, FactCategory, FactValue, Facts};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::llm::{as_text, complete_json};

const DEFAULT_CONFIDENCE: f64 = 0.5;

const SYSTEM_PROMPT: &str = "You extract facts about the user from a single chat message.
Return a JSON object whose keys are snake_case fact names (for example name, company, role, email, phone, industry, company_size, budget, timeline, location, pain_points, requirements, current_solution, decision_maker).
Each value is an object: {\"value\": string or number, \"confidence\": number between 0 and 1, \"category\": one of personal, business, requirements, pain_points, preferences}.
Only include facts stated or clearly implied in the message. Skip facts whose keys are already known.
Return {} when the message contains no new facts.";

/// Pulls structured facts out of free text through an LLM.
///
/// Extraction never fails: provider errors, timeouts, and unparseable
/// output all yield an empty fact set.
pub struct FactExtractor {
    provider: Option<Arc<dyn ProviderAdapter>>,
    model: String,
    config: ExtractionConfig,
}

impl FactExtractor {
    /// `default_model` applies when the extraction config names none.
    pub fn new(
        provider: Option<Arc<dyn ProviderAdapter>>,
        default_model: &str,
        config: ExtractionConfig,
    ) -> Self {
        let model = config.model.clone().unwrap_or_else(|| default_model.to_string());
        Self {
            provider,
            model,
            config,
        }
    }

    /// Facts newly stated in `message` that are not among `existing`.
    pub async fn extract(&self, message: &str, existing: &Facts) -> Facts {
        if message.trim().is_empty() {
            return Facts::new();
        }

        let request = ProviderRequest::single(&self.model, build_prompt(message, existing), self.config.max_tokens)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.1);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        match complete_json(self.provider.as_ref(), request, timeout).await {
            Ok(object) => {
                let facts = parse_facts(object);
                counter!("parley_facts_extracted_total").increment(facts.len() as u64);
                debug!(count = facts.len(), "facts extracted");
                facts
            }
            Err(e) => {
                warn!(error = %e, "fact extraction failed, substituting no new facts");
                Facts::new()
            }
        }
    }

    pub fn merge_threshold(&self) -> f64 {
        self.config.merge_threshold
    }

    /// Merges with the live-turn confidence threshold.
    pub fn merge(&self, existing: &Facts, new: &Facts) -> Facts {
        merge_facts(existing, new, self.config.merge_threshold)
    }

    /// Extracts over every user message in order, merging as it goes with
    /// the batch threshold.
    pub async fn extract_from_history(&self, messages: &[ChatMessage]) -> Facts {
        let mut facts = Facts::new();
        for message in messages.iter().filter(|m| m.is_user()) {
            let found = self.extract(&message.content, &facts).await;
            facts = merge_facts(&facts, &found, self.config.batch_threshold);
        }
        facts
    }
}

fn build_prompt(message: &str, existing: &Facts) -> String {
    let known = if existing.is_empty() {
        "none".to_string()
    } else {
        existing.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
    };
    format!("Known fact keys: {known}\n\nUser message:\n{message}")
}

/// Validates raw model output into facts.
///
/// Entries without a usable value are dropped, confidence defaults to 0.5
/// and is clamped, and unrecognized categories are kept as `unknown`.
pub fn parse_facts(mut object: Map<String, Value>) -> Facts {
    if object.len() == 1
        && let Some(Value::Object(inner)) = object.remove("facts")
    {
        object = inner;
    }

    let mut facts = Facts::new();
    for (key, entry) in object {
        let Value::Object(fields) = entry else {
            debug!(key = %key, "dropping fact without an object body");
            continue;
        };

        let Some(value) = fields.get("value").and_then(fact_value) else {
            debug!(key = %key, "dropping fact without a usable value");
            continue;
        };

        let confidence = fields
            .get("confidence")
            .and_then(|c| c.as_f64().or_else(|| c.as_str().and_then(|s| s.trim().parse().ok())))
            .unwrap_or(DEFAULT_CONFIDENCE);

        let category = match fields.get("category").and_then(as_text) {
            None => FactCategory::Unknown,
            Some(raw) => FactCategory::from_str(&raw.to_lowercase()).unwrap_or_else(|_| {
                warn!(key = %key, category = %raw, "suspect category on extracted fact");
                FactCategory::Unknown
            }),
        };

        facts.insert(key, Fact::new(value, confidence, category));
    }
    facts
}

fn fact_value(raw: &Value) -> Option<FactValue> {
    let value = match raw {
        Value::Number(n) => FactValue::Number(n.as_f64()?),
        Value::String(s) => FactValue::Text(s.trim().to_string()),
        Value::Bool(b) => FactValue::Text(b.to_string()),
        _ => return None,
    };
    (!value.is_blank()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use serde_json::json;
    use tracing_test::traced_test;

    fn extractor(provider: Arc<ScriptedProvider>) -> FactExtractor {
        FactExtractor::new(Some(provider), "test-model", ExtractionConfig::default())
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn extracts_and_merges_confident_facts() {
        let provider = ScriptedProvider::new()
            .reply(
                r#"{"name":{"value":"Ahmed","confidence":0.95,"category":"personal"},"company":{"value":"TechCorp","confidence":0.9,"category":"business"}}"#,
            )
            .shared();
        let extractor = extractor(provider.clone());

        let found = extractor.extract("Hi, I'm Ahmed from TechCorp", &Facts::new()).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found["name"].value, FactValue::from("Ahmed"));
        assert_eq!(found["company"].category, FactCategory::Business);

        let merged = extractor.merge(&Facts::new(), &found);
        assert!(merged.contains_key("name") && merged.contains_key("company"));

        let requests = provider.requests();
        let request = &requests[0];
        assert!(request.json_mode);
        assert_eq!(request.model, "test-model");
        assert!(request.messages[0].content.contains("Known fact keys: none"));
    }

    #[tokio::test]
    async fn prompt_lists_known_keys() {
        let provider = ScriptedProvider::new().reply("{}").shared();
        let mut existing = Facts::new();
        existing.insert("name".into(), Fact::new("Ahmed", 0.9, FactCategory::Personal));
        existing.insert("budget".into(), Fact::new(5000.0, 0.8, FactCategory::Business));

        let found = extractor(provider.clone()).extract("we have 20 staff", &existing).await;
        assert!(found.is_empty());
        assert!(provider.requests()[0].messages[0].content.contains("Known fact keys: budget, name"));
    }

    #[test]
    fn parse_drops_blank_and_defaults_confidence() {
        let facts = parse_facts(object(json!({
            "name": {"value": "  ", "confidence": 0.9},
            "email": {"confidence": 0.9},
            "role": "CTO",
            "company_size": {"value": 50, "category": "business"},
            "budget": {"value": "$10k", "confidence": 3.0, "category": "Business"},
            "timeline": {"value": "Q3", "confidence": "0.8"}
        })));

        assert_eq!(facts.keys().collect::<Vec<_>>(), ["budget", "company_size", "timeline"]);
        assert_eq!(facts["company_size"].confidence, 0.5);
        assert_eq!(facts["company_size"].value, FactValue::Number(50.0));
        assert_eq!(facts["budget"].confidence, 1.0);
        assert_eq!(facts["budget"].category, FactCategory::Business);
        assert_eq!(facts["timeline"].confidence, 0.8);
        assert_eq!(facts["timeline"].category, FactCategory::Unknown);
    }

    #[test]
    fn parse_unwraps_facts_envelope() {
        let facts = parse_facts(object(json!({
            "facts": {"name": {"value": "Sara", "confidence": 0.9, "category": "personal"}}
        })));
        assert_eq!(facts["name"].value, FactValue::from("Sara"));
    }

    #[traced_test]
    #[test]
    fn suspect_category_is_kept_and_logged() {
        let facts = parse_facts(object(json!({
            "hobby": {"value": "sailing", "confidence": 0.8, "category": "lifestyle"}
        })));
        assert_eq!(facts["hobby"].category, FactCategory::Unknown);
        assert!(logs_contain("suspect category"));
    }

    #[tokio::test]
    #[traced_test]
    async fn provider_failure_yields_no_facts() {
        let provider = ScriptedProvider::new().fail("upstream 500").shared();
        let found = extractor(provider).extract("I'm Sara", &Facts::new()).await;
        assert!(found.is_empty());
        assert!(logs_contain("fact extraction failed"));
    }

    #[tokio::test]
    async fn malformed_output_yields_no_facts() {
        let provider = ScriptedProvider::new().reply("I could not find anything").shared();
        assert!(extractor(provider).extract("hello", &Facts::new()).await.is_empty());
    }

    #[tokio::test]
    async fn missing_provider_yields_no_facts() {
        let extractor = FactExtractor::new(None, "m", ExtractionConfig::default());
        assert!(extractor.extract("I'm Sara", &Facts::new()).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = ScriptedProvider::new()
            .reply(r#"{"name":{"value":"Sara","confidence":0.9}}"#)
            .with_delay(Duration::from_secs(60))
            .shared();
        assert!(extractor(provider).extract("I'm Sara", &Facts::new()).await.is_empty());
    }

    #[tokio::test]
    async fn blank_message_skips_the_provider() {
        let provider = ScriptedProvider::new().shared();
        assert!(extractor(provider.clone()).extract("   ", &Facts::new()).await.is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn history_extraction_reads_user_turns_with_batch_threshold() {
        let provider = ScriptedProvider::new()
            .reply(r#"{"name":{"value":"Sara","confidence":0.65,"category":"personal"}}"#)
            .reply(r#"{"budget":{"value":"5000","confidence":0.5,"category":"business"}}"#)
            .shared();
        let messages = vec![
            ChatMessage::user("I'm Sara"),
            ChatMessage::assistant("Nice to meet you"),
            ChatMessage::user("budget is maybe 5000"),
        ];

        let facts = extractor(provider.clone()).extract_from_history(&messages).await;
        assert_eq!(provider.requests().len(), 2);
        assert!(facts.contains_key("name"), "0.65 clears the 0.6 batch threshold");
        assert!(!facts.contains_key("budget"));
        assert!(provider.requests()[1].messages[0].content.contains("Known fact keys: name"));
    }
}
