// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replaceable funnel heuristics.
//!
//! The stage detector and intent tracker consult these tables through traits
//! so a learned model can stand in for the hand-tuned defaults.

use parley_memory::{FunnelStage, IntentKind};

/// Maps an observed intent to the funnel stage it signals.
pub trait IntentStageMap: Send + Sync {
    /// `None` when the intent carries no stage signal.
    fn stage_for(&self, intent: IntentKind) -> Option<FunnelStage>;
}

/// Likely follow-up intents, most likely first.
pub trait IntentProgression: Send + Sync {
    fn next_intents(&self, current: IntentKind) -> &'static [IntentKind];
}

/// Hand-tuned tables for a typical sales funnel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFunnelTables;

impl IntentStageMap for DefaultFunnelTables {
    fn stage_for(&self, intent: IntentKind) -> Option<FunnelStage> {
        use IntentKind as I;
        Some(match intent {
            I::Greeting => FunnelStage::Greeting,
            I::Inquiry | I::Support => FunnelStage::Discovery,
            I::Comparison => FunnelStage::Solution,
            I::Pricing => FunnelStage::Pricing,
            I::Objection => FunnelStage::ObjectionHandling,
            I::Commitment | I::Scheduling | I::Closing => FunnelStage::Closing,
            I::Feedback => return None,
        })
    }
}

impl IntentProgression for DefaultFunnelTables {
    fn next_intents(&self, current: IntentKind) -> &'static [IntentKind] {
        use IntentKind as I;
        match current {
            I::Greeting => &[I::Inquiry, I::Pricing],
            I::Inquiry => &[I::Comparison, I::Pricing, I::Scheduling],
            I::Support => &[I::Inquiry, I::Feedback],
            I::Comparison => &[I::Pricing, I::Objection],
            I::Pricing => &[I::Objection, I::Commitment],
            I::Objection => &[I::Pricing, I::Commitment],
            I::Scheduling => &[I::Commitment, I::Closing],
            I::Commitment => &[I::Closing],
            I::Feedback => &[I::Closing],
            I::Closing => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_intent_but_feedback_maps_to_a_stage() {
        let tables = DefaultFunnelTables;
        for intent in IntentKind::ALL {
            assert_eq!(
                tables.stage_for(intent).is_none(),
                intent == IntentKind::Feedback,
                "{intent}"
            );
        }
    }

    #[test]
    fn closing_is_terminal() {
        let tables = DefaultFunnelTables;
        assert!(tables.next_intents(IntentKind::Closing).is_empty());
        for intent in IntentKind::ALL {
            if intent != IntentKind::Closing {
                assert!(!tables.next_intents(intent).is_empty(), "{intent}");
            }
        }
    }
}
