// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn conversation context for Parley.
//!
//! The [`ContextManager`] combines fact extraction, intent and funnel-stage
//! detection, rolling summaries, profile linking, and semantic history
//! search into a [`ContextBundle`] ready to inject into a response prompt.

pub mod extractor;
pub mod intent;
mod llm;
pub mod manager;
pub mod prompt;
pub mod stage;
pub mod summarizer;
pub mod tables;

#[cfg(test)]
mod testing;

pub use extractor::{parse_facts, FactExtractor};
pub use intent::{IntentDetector, IntentResult, IntentTracker};
pub use manager::{
    ContextBundle, ContextManager, ContextRequest, ContextServices, SessionReport, FALLBACK_GUIDANCE,
};
pub use prompt::{build_prompt_context, summary_text, PromptInputs, TRUNCATION_MARKER};
pub use stage::{detect_stage, stage_guidance, StageDetector, DEFAULT_STUCK_THRESHOLD};
pub use summarizer::{validate_summary, ConversationSummarizer, SummaryKind};
pub use tables::{DefaultFunnelTables, IntentProgression, IntentStageMap};
