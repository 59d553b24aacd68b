// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Confidence-based fact merging.

use chrono::Utc;

use crate::types::Facts;

/// Merges `incoming` into `existing`.
///
/// Incoming facts below `threshold` are dropped. A known key is replaced when
/// the incoming confidence is strictly higher, or equal with a different
/// value; value changes are stamped with `updated_at`.
pub fn merge_facts(existing: &Facts, incoming: &Facts, threshold: f64) -> Facts {
    let mut merged = existing.clone();

    for (key, fact) in incoming {
        if fact.confidence < threshold {
            continue;
        }

        match merged.get(key) {
            None => {
                merged.insert(key.clone(), fact.clone());
            }
            Some(current) => {
                let changed = current.value != fact.value;
                let wins = fact.confidence > current.confidence
                    || (fact.confidence == current.confidence && changed);
                if wins {
                    let mut replacement = fact.clone();
                    if changed {
                        replacement.updated_at = Some(Utc::now());
                    }
                    merged.insert(key.clone(), replacement);
                }
            }
        }
    }

    merged
}
