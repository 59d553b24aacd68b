// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sales-funnel stage detection and tracking.

use std::sync::Arc;

use chrono::Utc;
use parley_core::types::ChatMessage;
use parley_memory::{Facts, FunnelStage, IntentRecord, StageRecord, StageState};

use crate::tables::IntentStageMap;

/// Detections above this confidence are recorded even without a transition.
pub const REAFFIRM_CONFIDENCE: f64 = 0.7;

/// Consecutive same-stage updates after which a session counts as stuck.
pub const DEFAULT_STUCK_THRESHOLD: u32 = 5;

const INTENT_WINDOW: usize = 3;
const MESSAGE_WINDOW: usize = 3;

const STAGE_INDICATORS: [(FunnelStage, &[&str]); 6] = [
    (FunnelStage::Greeting, &["hi", "hello", "hey", "good morning", "good afternoon"]),
    (
        FunnelStage::Discovery,
        &["need", "looking for", "problem", "challenge", "currently", "interested", "how does", "tell me"],
    ),
    (
        FunnelStage::Solution,
        &["feature", "features", "integrate", "integration", "solution", "demo", "capability", "works with"],
    ),
    (
        FunnelStage::Pricing,
        &["price", "pricing", "cost", "budget", "plan", "quote", "how much", "discount"],
    ),
    (
        FunnelStage::ObjectionHandling,
        &["expensive", "concern", "worried", "not sure", "competitor", "risk", "doubt"],
    ),
    (
        FunnelStage::Closing,
        &["buy", "sign up", "contract", "purchase", "ready", "proceed", "onboarding", "get started"],
    ),
];

/// Fact keys that count as one indicator hit for their stage.
const FACT_SIGNALS: [(&str, FunnelStage); 3] = [
    ("pain_points", FunnelStage::Discovery),
    ("requirements", FunnelStage::Discovery),
    ("budget", FunnelStage::Pricing),
];

/// Infers the funnel stage of a conversation.
///
/// Tries, in order: opening turns, the latest mapped intents, keyword
/// indicators in recent user messages, and finally message-count thresholds.
pub fn detect_stage(
    history: &[ChatMessage],
    intent_history: &[IntentRecord],
    facts: &Facts,
    map: &dyn IntentStageMap,
) -> (FunnelStage, f64) {
    if history.is_empty() {
        return (FunnelStage::Greeting, 1.0);
    }

    let user_messages: Vec<&ChatMessage> = history.iter().filter(|m| m.is_user()).collect();
    if user_messages.len() <= 1 {
        return (FunnelStage::Greeting, 0.9);
    }

    if let Some(found) = from_intents(intent_history, map) {
        return found;
    }

    let window = &user_messages[user_messages.len().saturating_sub(MESSAGE_WINDOW)..];
    if let Some(found) = from_indicators(window, facts) {
        return found;
    }

    match user_messages.len() {
        0..=2 => (FunnelStage::Greeting, 0.5),
        3..=4 => (FunnelStage::Discovery, 0.5),
        5..=8 => (FunnelStage::Solution, 0.4),
        _ => (FunnelStage::Pricing, 0.3),
    }
}

fn from_intents(intent_history: &[IntentRecord], map: &dyn IntentStageMap) -> Option<(FunnelStage, f64)> {
    let recent = &intent_history[intent_history.len().saturating_sub(INTENT_WINDOW)..];
    let mapped: Vec<FunnelStage> = recent.iter().filter_map(|r| map.stage_for(r.intent)).collect();
    let latest = *mapped.last()?;
    let repeats = mapped.iter().filter(|s| **s == latest).count() - 1;
    Some((latest, (0.6 + 0.2 * repeats as f64).min(1.0)))
}

fn from_indicators(window: &[&ChatMessage], facts: &Facts) -> Option<(FunnelStage, f64)> {
    let texts: Vec<String> = window
        .iter()
        .map(|m| {
            let cleaned: String = m
                .content
                .to_lowercase()
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { ' ' })
                .collect();
            format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
        })
        .collect();

    let mut best: Option<(FunnelStage, usize)> = None;
    for (stage, indicators) in STAGE_INDICATORS {
        let mut hits: usize = texts
            .iter()
            .map(|text| {
                indicators
                    .iter()
                    .filter(|kw| text.contains(&format!(" {kw} ")))
                    .count()
            })
            .sum();
        hits += FACT_SIGNALS
            .iter()
            .filter(|(key, signal)| *signal == stage && facts.contains_key(*key))
            .count();
        if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
            best = Some((stage, hits));
        }
    }

    let (stage, hits) = best?;
    let confidence = (hits as f64 / (window.len() * 2) as f64).min(1.0);
    Some((stage, confidence))
}

/// Tracks the current stage of one session across turns.
#[derive(Clone)]
pub struct StageDetector {
    state: StageState,
    map: Arc<dyn IntentStageMap>,
}

impl std::fmt::Debug for StageDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDetector")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StageDetector {
    pub fn new(map: Arc<dyn IntentStageMap>) -> Self {
        Self::from_state(StageState::default(), map)
    }

    pub fn from_state(state: StageState, map: Arc<dyn IntentStageMap>) -> Self {
        Self { state, map }
    }

    pub fn to_state(&self) -> StageState {
        self.state.clone()
    }

    pub fn current_stage(&self) -> FunnelStage {
        self.state.current_stage
    }

    pub fn confidence(&self) -> f64 {
        self.state.confidence
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.state.history
    }

    pub fn detect(
        &self,
        history: &[ChatMessage],
        intent_history: &[IntentRecord],
        facts: &Facts,
    ) -> (FunnelStage, f64) {
        detect_stage(history, intent_history, facts, self.map.as_ref())
    }

    /// Applies a detection. Returns whether a history row was appended.
    ///
    /// A row is appended when the stage changes or the detection is
    /// confident enough to count as a re-affirmation.
    pub fn update_stage(&mut self, stage: FunnelStage, confidence: f64) -> bool {
        let changed = stage != self.state.current_stage;
        self.state.updates_in_stage = if changed {
            1
        } else {
            self.state.updates_in_stage.saturating_add(1)
        };
        self.state.confidence = confidence;

        if !changed && confidence <= REAFFIRM_CONFIDENCE {
            return false;
        }
        self.state.current_stage = stage;
        self.state.history.push(StageRecord {
            stage,
            confidence,
            timestamp: Utc::now(),
        });
        true
    }

    /// False only when the latest recorded move went back down the funnel.
    ///
    /// Entering objection handling is never a regression.
    pub fn is_progressing(&self) -> bool {
        let [.., previous, latest] = self.state.history.as_slice() else {
            return true;
        };
        latest.stage == previous.stage
            || latest.stage == FunnelStage::ObjectionHandling
            || latest.stage.index() >= previous.stage.index()
    }

    pub fn is_stuck(&self, threshold: u32) -> bool {
        self.state.updates_in_stage >= threshold
    }
}

/// Response guidance for the assistant at each stage.
pub fn stage_guidance(stage: FunnelStage) -> &'static str {
    match stage {
        FunnelStage::Greeting => {
            "Welcome the user warmly, introduce yourself briefly, and ask how you can help."
        }
        FunnelStage::Discovery => {
            "Ask open questions to understand the user's needs, current situation, and pain points."
        }
        FunnelStage::Solution => {
            "Connect the user's stated needs to specific features and explain the benefits concretely."
        }
        FunnelStage::Pricing => {
            "Be transparent about pricing, relate cost to the value for their needs, and offer options."
        }
        FunnelStage::ObjectionHandling => {
            "Acknowledge the concern, address it with facts, and check whether it is resolved."
        }
        FunnelStage::Closing => {
            "Summarize the agreed value, propose a clear next step, and make it easy to proceed."
        }
    }
}
