// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembly of the prompt-context block injected ahead of a response.

use parley_memory::{
    ConversationSummary, Facts, FunnelStage, IntentRecord, ProfileContext, RelevantConversation,
    PRIORITY_FACT_KEYS,
};

/// Appended when the assembled context exceeds its character budget.
pub const TRUNCATION_MARKER: &str = "\n[context truncated]";

const RECENT_INTENTS: usize = 3;

/// Everything the prompt block is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub profile: Option<&'a ProfileContext>,
    pub stage: FunnelStage,
    pub stage_confidence: f64,
    pub intents: &'a [IntentRecord],
    pub facts: &'a Facts,
    pub summary: Option<&'a ConversationSummary>,
    pub relevant: &'a [RelevantConversation],
}

/// Renders the profile, session, summary, and past-conversation sections in
/// that order, separated by blank lines and cut to `max_chars`.
pub fn build_prompt_context(inputs: &PromptInputs<'_>, max_chars: usize) -> String {
    let sections: Vec<String> = [
        inputs.profile.map(profile_section),
        Some(session_section(inputs)),
        inputs.summary.filter(|s| !s.is_empty()).map(summary_section),
        (!inputs.relevant.is_empty()).then(|| past_section(inputs.relevant)),
    ]
    .into_iter()
    .flatten()
    .collect();

    truncate(sections.join("\n\n"), max_chars)
}

/// The prose form of a summary for callers that want a single string.
pub fn summary_text(summary: &ConversationSummary) -> Option<String> {
    if summary.is_empty() {
        return None;
    }
    let text = if summary.detailed_summary.is_empty() {
        &summary.short_summary
    } else {
        &summary.detailed_summary
    };
    (!text.is_empty()).then(|| text.clone())
}

fn profile_section(profile: &ProfileContext) -> String {
    let mut lines = vec!["## User Profile".to_string()];
    if let Some(name) = &profile.display_name {
        lines.push(format!("Name: {name}"));
    }
    lines.push(format!(
        "Sessions: {} (engagement: {})",
        profile.total_sessions, profile.engagement_level
    ));
    let facts: Vec<String> = profile
        .facts
        .iter()
        .filter(|(key, _)| key != "name")
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    if !facts.is_empty() {
        lines.push(format!("Known: {}", facts.join("; ")));
    }
    if !profile.recent_sessions.is_empty() {
        lines.push("Recent sessions:".to_string());
        lines.extend(profile.recent_sessions.iter().map(|s| format!("- {s}")));
    }
    lines.join("\n")
}

fn session_section(inputs: &PromptInputs<'_>) -> String {
    let mut lines = vec![
        "## Current Session".to_string(),
        format!("Stage: {} (confidence {:.2})", inputs.stage, inputs.stage_confidence),
    ];

    let skip = inputs.intents.len().saturating_sub(RECENT_INTENTS);
    let intents: Vec<String> = inputs.intents[skip..].iter().map(|r| r.intent.to_string()).collect();
    if !intents.is_empty() {
        lines.push(format!("Recent intents: {}", intents.join(", ")));
    }

    let facts: Vec<String> = PRIORITY_FACT_KEYS
        .iter()
        .filter_map(|&key| inputs.facts.get(key).map(|f| format!("{key}: {}", f.value)))
        .collect();
    if !facts.is_empty() {
        lines.push(format!("Key facts: {}", facts.join("; ")));
    }
    lines.join("\n")
}

fn summary_section(summary: &ConversationSummary) -> String {
    let mut lines = vec!["## Conversation Summary".to_string()];
    if let Some(text) = summary_text(summary) {
        lines.push(text);
    }
    for (label, items) in [
        ("Topics", &summary.main_topics),
        ("Needs", &summary.user_needs),
        ("Next steps", &summary.next_steps),
    ] {
        if !items.is_empty() {
            lines.push(format!("{label}: {}", items.join(", ")));
        }
    }
    lines.join("\n")
}

fn past_section(relevant: &[RelevantConversation]) -> String {
    let mut lines = vec!["## Relevant Past Conversations".to_string()];
    for hit in relevant {
        let conversation = &hit.conversation;
        let mut line = format!("- [{}] {}", hit.recency, conversation.short_summary);
        if !conversation.main_topics.is_empty() {
            line.push_str(&format!(" (topics: {})", conversation.main_topics.join(", ")));
        }
        lines.push(line);
    }
    lines.join("\n")
}

fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_memory::{
        EngagementLevel, Fact, FactCategory, IndexedConversation, IntentKind, Outcome, Sentiment,
    };

    fn facts() -> Facts {
        let mut facts = Facts::new();
        facts.insert("company".into(), Fact::new("TechCorp", 0.9, FactCategory::Business));
        facts.insert("name".into(), Fact::new("Ahmed", 0.95, FactCategory::Personal));
        facts.insert("favourite_colour".into(), Fact::new("teal", 0.9, FactCategory::Preferences));
        facts
    }

    fn summary() -> ConversationSummary {
        ConversationSummary {
            short_summary: "Asked about pricing".into(),
            detailed_summary: "Ahmed asked about the premium plan for 50 seats.".into(),
            main_topics: vec!["pricing".into()],
            message_count: 20,
            ..ConversationSummary::empty()
        }
    }

    fn past() -> RelevantConversation {
        RelevantConversation {
            conversation: IndexedConversation {
                session_id: "s-old".into(),
                tenant_id: "t".into(),
                bot_id: "b".into(),
                user_profile_id: None,
                short_summary: "Requested a demo".into(),
                detailed_summary: String::new(),
                key_facts: Default::default(),
                main_topics: vec!["demo".into(), "crm".into()],
                user_needs: vec![],
                next_steps: vec![],
                outcome: Outcome::FollowUp,
                sentiment_overall: Sentiment::Positive,
                message_count: 8,
                indexed_at: Utc::now(),
            },
            score: 0.8,
            recency: "2 days ago".into(),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let profile = ProfileContext {
            profile_id: "p1".into(),
            display_name: Some("Ahmed".into()),
            facts: vec![("name".into(), "Ahmed".into()), ("role".into(), "CTO".into())],
            total_sessions: 3,
            engagement_level: EngagementLevel::Returning,
            recent_sessions: vec!["Looked at plans".into()],
        };
        let facts = facts();
        let intents = [
            IntentRecord::new(IntentKind::Greeting, 0.9, "hi"),
            IntentRecord::new(IntentKind::Inquiry, 0.6, "what"),
            IntentRecord::new(IntentKind::Comparison, 0.6, "vs"),
            IntentRecord::new(IntentKind::Pricing, 0.8, "price"),
        ];
        let summary = summary();
        let relevant = [past()];
        let inputs = PromptInputs {
            profile: Some(&profile),
            stage: FunnelStage::Pricing,
            stage_confidence: 0.8,
            intents: &intents,
            facts: &facts,
            summary: Some(&summary),
            relevant: &relevant,
        };

        let text = build_prompt_context(&inputs, 4000);
        let positions: Vec<usize> = [
            "## User Profile",
            "## Current Session",
            "## Conversation Summary",
            "## Relevant Past Conversations",
        ]
        .iter()
        .map(|h| text.find(h).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(text.contains("Recent intents: inquiry, comparison, pricing"));
        assert!(text.contains("Key facts: name: Ahmed; company: TechCorp"));
        assert!(!text.contains("favourite_colour"));
        assert!(text.contains("- [2 days ago] Requested a demo (topics: demo, crm)"));
        assert!(text.contains("Known: role: CTO"));
        assert!(text.contains("\n\n## Current Session"));
        assert!(!text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn optional_sections_are_omitted() {
        let facts = Facts::new();
        let sentinel = ConversationSummary::empty();
        let inputs = PromptInputs {
            profile: None,
            stage: FunnelStage::Greeting,
            stage_confidence: 1.0,
            intents: &[],
            facts: &facts,
            summary: Some(&sentinel),
            relevant: &[],
        };
        let text = build_prompt_context(&inputs, 4000);
        assert_eq!(text, "## Current Session\nStage: greeting (confidence 1.00)");
    }

    #[test]
    fn long_context_is_cut_with_marker() {
        let mut facts = Facts::new();
        facts.insert("requirements".into(), Fact::new("é".repeat(5000), 0.9, FactCategory::Requirements));
        let inputs = PromptInputs {
            profile: None,
            stage: FunnelStage::Discovery,
            stage_confidence: 0.6,
            intents: &[],
            facts: &facts,
            summary: None,
            relevant: &[],
        };
        let text = build_prompt_context(&inputs, 4000);
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert_eq!(text.chars().count(), 4000 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn summary_text_prefers_detail() {
        assert_eq!(
            summary_text(&summary()).as_deref(),
            Some("Ahmed asked about the premium plan for 50 seats.")
        );
        assert_eq!(summary_text(&ConversationSummary::empty()), None);
    }
}
