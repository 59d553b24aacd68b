// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule-based intent classification and the per-session intent log.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parley_core::types::ChatMessage;
use parley_memory::{FunnelStage, IntentKind, IntentRecord};
use regex::Regex;

use crate::tables::IntentProgression;

/// Score added per matched keyword.
const KEYWORD_WEIGHT: u32 = 1;
/// Score added per matched pattern.
const PATTERN_WEIGHT: u32 = 2;
/// Keywords beyond this many do not raise a category's theoretical maximum.
const KEYWORD_CAP: u32 = 3;
/// Raw score at which the flat confidence bonus applies.
const STRONG_SIGNAL: u32 = 3;
const STRONG_SIGNAL_BONUS: f64 = 0.2;

const FIRST_MESSAGE_GREETING_BOOST: u32 = 2;
const STAGE_BOOST: u32 = 1;

const WH_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "whom", "whose", "which"];

struct IntentRule {
    kind: IntentKind,
    keywords: &'static [&'static str],
    patterns: Vec<Regex>,
}

impl IntentRule {
    fn new(kind: IntentKind, keywords: &'static [&'static str], patterns: &[&str]) -> Self {
        Self {
            kind,
            keywords,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("intent patterns are valid"))
                .collect(),
        }
    }

    fn max_score(&self) -> u32 {
        (self.keywords.len() as u32).min(KEYWORD_CAP) * KEYWORD_WEIGHT
            + self.patterns.len() as u32 * PATTERN_WEIGHT
    }
}

static RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    use IntentKind as I;
    vec![
        IntentRule::new(
            I::Greeting,
            &["hi", "hello", "hey", "good morning", "good afternoon", "good evening", "greetings", "howdy"],
            &[r"^\s*(hi|hello|hey|greetings|howdy)\b"],
        ),
        IntentRule::new(
            I::Inquiry,
            &["tell me", "information", "info", "explain", "wondering", "learn more", "details", "features", "interested in"],
            &[r"^\s*(what|how|why|when|where|who|which|can|could|does|do|is|are)\b[^?]*\?"],
        ),
        IntentRule::new(
            I::Pricing,
            &["price", "pricing", "cost", "costs", "how much", "budget", "plan", "plans", "subscription", "fee", "quote", "discount"],
            &[r"\bhow much\b", r"\$\s?\d|\b\d+\s?(usd|dollars|euros?)\b"],
        ),
        IntentRule::new(
            I::Comparison,
            &["compare", "compared", "comparison", "versus", "vs", "better than", "difference", "alternative", "alternatives", "competitor"],
            &[r"\b(vs\.?|versus|compared (to|with))\s"],
        ),
        IntentRule::new(
            I::Objection,
            &["too expensive", "not sure", "concern", "concerned", "worried", "hesitant", "doubt", "risky", "don't need", "can't afford"],
            &[r"\b(too|very|quite)\s+(expensive|costly|pricey)\b", r"\bnot\s+(sure|convinced|ready)\b"],
        ),
        IntentRule::new(
            I::Commitment,
            &["buy", "purchase", "sign up", "get started", "subscribe", "ready to", "let's do it", "go ahead", "proceed", "order"],
            &[r"\b(i'?ll|we'?ll|i want to|we want to|let'?s)\s+(buy|take|go with|sign up|purchase|proceed)\b"],
        ),
        IntentRule::new(
            I::Scheduling,
            &["schedule", "book", "booking", "appointment", "demo", "meeting", "call", "availability", "available", "calendar"],
            &[
                r"\b(book|schedule|arrange|set up)\s+(a\s+|an\s+)?(demo|call|meeting|appointment)\b",
                r"\b(tomorrow|next week|monday|tuesday|wednesday|thursday|friday)\b",
            ],
        ),
        IntentRule::new(
            I::Support,
            &["help", "issue", "problem", "error", "broken", "not working", "bug", "fix", "support", "trouble"],
            &[r"\b(doesn'?t|does not|isn'?t|won'?t|can'?t|cannot)\s+(work|load|connect|open|log ?in)\b"],
        ),
        IntentRule::new(
            I::Feedback,
            &["feedback", "suggestion", "great", "love", "awesome", "terrible", "disappointed", "review", "recommend"],
            &[],
        ),
        IntentRule::new(
            I::Closing,
            &["thanks", "thank you", "bye", "goodbye", "that's all", "see you", "have a good", "cheers"],
            &[],
        ),
    ]
});

/// Classification of one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub intent: IntentKind,
    pub confidence: f64,
    pub secondary_intent: Option<IntentKind>,
    /// Keywords of the primary intent found in the message.
    pub keywords: Vec<String>,
}

/// Stateless keyword and pattern scorer over the fixed intent categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `message`. `history` holds the turns before it.
    pub fn detect(
        &self,
        message: &str,
        history: &[ChatMessage],
        current_stage: Option<FunnelStage>,
    ) -> IntentResult {
        let lowered = message.to_lowercase();
        let padded = normalize(&lowered);

        let mut scores: Vec<(IntentKind, u32, Vec<&'static str>)> = RULES
            .iter()
            .map(|rule| {
                let hits: Vec<&'static str> = rule
                    .keywords
                    .iter()
                    .copied()
                    .filter(|kw| padded.contains(&format!(" {kw} ")))
                    .collect();
                let pattern_hits = rule.patterns.iter().filter(|p| p.is_match(&lowered)).count() as u32;
                let score = hits.len() as u32 * KEYWORD_WEIGHT + pattern_hits * PATTERN_WEIGHT;
                (rule.kind, score, hits)
            })
            .collect();

        if scores.iter().all(|(_, score, _)| *score == 0) {
            return structural_fallback(&lowered, &padded);
        }

        let first_user_message = !history.iter().any(ChatMessage::is_user);
        for (kind, score, _) in scores.iter_mut().filter(|(_, score, _)| *score > 0) {
            *score += boost(*kind, first_user_message, current_stage);
        }

        // Stable sort keeps declaration order among ties.
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        let mut ranked = scores.into_iter();
        let Some((intent, top, keywords)) = ranked.next() else {
            return structural_fallback(&lowered, &padded);
        };

        let max = RULES
            .iter()
            .find(|rule| rule.kind == intent)
            .map(IntentRule::max_score)
            .unwrap_or(1)
            .max(1);
        let mut confidence = (f64::from(top) / f64::from(max)).clamp(0.0, 1.0);
        if top >= STRONG_SIGNAL {
            confidence = (confidence + STRONG_SIGNAL_BONUS).min(1.0);
        }

        let secondary_intent = ranked
            .next()
            .filter(|(_, score, _)| *score > 0 && (*score >= 2 || score * 2 >= top))
            .map(|(kind, _, _)| kind);

        IntentResult {
            intent,
            confidence,
            secondary_intent,
            keywords: keywords.into_iter().map(String::from).collect(),
        }
    }
}

fn boost(kind: IntentKind, first_user_message: bool, stage: Option<FunnelStage>) -> u32 {
    let mut extra = 0;
    if first_user_message && kind == IntentKind::Greeting {
        extra += FIRST_MESSAGE_GREETING_BOOST;
    }
    match (stage, kind) {
        (Some(FunnelStage::Pricing), IntentKind::Pricing)
        | (Some(FunnelStage::Closing), IntentKind::Commitment | IntentKind::Objection) => {
            extra += STAGE_BOOST;
        }
        _ => {}
    }
    extra
}

fn structural_fallback(lowered: &str, padded: &str) -> IntentResult {
    let first_word = padded.split_whitespace().next().unwrap_or_default();
    let (intent, confidence) = if lowered.contains('?') || WH_WORDS.contains(&first_word) {
        (IntentKind::Inquiry, 0.5)
    } else if padded.split_whitespace().count() <= 3 {
        (IntentKind::Greeting, 0.4)
    } else {
        (IntentKind::Inquiry, 0.3)
    };
    IntentResult {
        intent,
        confidence,
        secondary_intent: None,
        keywords: Vec::new(),
    }
}

/// Lowercased words separated by single spaces, padded at both ends so
/// phrase lookups match on word boundaries.
fn normalize(lowered: &str) -> String {
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    format!(" {} ", words.join(" "))
}

/// Append-only log of detected intents for one session.
#[derive(Clone)]
pub struct IntentTracker {
    records: Vec<IntentRecord>,
    progression: Arc<dyn IntentProgression>,
}

impl std::fmt::Debug for IntentTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentTracker")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl IntentTracker {
    pub fn new(progression: Arc<dyn IntentProgression>) -> Self {
        Self::with_records(Vec::new(), progression)
    }

    /// Resumes a tracker from a persisted log.
    pub fn with_records(records: Vec<IntentRecord>, progression: Arc<dyn IntentProgression>) -> Self {
        Self {
            records,
            progression,
        }
    }

    pub fn add(&mut self, record: IntentRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IntentRecord] {
        &self.records
    }

    /// The intent with the highest frequency-times-average-confidence.
    ///
    /// Conversational bookends (greeting, closing, feedback) count half.
    pub fn get_dominant_intent(&self) -> Option<IntentKind> {
        let mut totals: HashMap<IntentKind, (u32, f64)> = HashMap::new();
        for record in &self.records {
            let entry = totals.entry(record.intent).or_default();
            entry.0 += 1;
            entry.1 += record.confidence;
        }

        IntentKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let (count, confidence_sum) = totals.get(&kind)?;
                let average = confidence_sum / f64::from(*count);
                let weight = match kind {
                    IntentKind::Greeting | IntentKind::Closing | IntentKind::Feedback => 0.5,
                    _ => 1.0,
                };
                Some((kind, f64::from(*count) * average * weight))
            })
            .fold(None, |best: Option<(IntentKind, f64)>, (kind, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((kind, score)),
            })
            .map(|(kind, _)| kind)
    }

    /// Most likely next intent after the latest one; `None` once closed.
    pub fn predict_next_intent(&self) -> Option<IntentKind> {
        let last = self.records.last()?;
        self.progression.next_intents(last.intent).first().copied()
    }
}
