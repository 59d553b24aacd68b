// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: probability ranges,
//! positive limits, and backend-specific required fields.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Vector store backends the binary knows how to build.
pub const VECTOR_BACKENDS: &[&str] = &["memory", "qdrant"];

/// Validate a deserialized configuration.
///
/// Collects every violation instead of stopping at the first.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(invalid("storage.database_path", "must not be empty"));
    }

    unit_interval(
        &mut errors,
        "extraction.merge_threshold",
        config.extraction.merge_threshold,
    );
    unit_interval(
        &mut errors,
        "extraction.batch_threshold",
        config.extraction.batch_threshold,
    );
    unit_interval(
        &mut errors,
        "history.min_score",
        f64::from(config.history.min_score),
    );

    let positive = [
        ("working_memory.ttl_secs", config.working_memory.ttl_secs as usize),
        ("working_memory.max_intents", config.working_memory.max_intents),
        (
            "profiles.max_session_summaries",
            config.profiles.max_session_summaries,
        ),
        ("summarizer.threshold", config.summarizer.threshold),
        ("history.top_k", config.history.top_k),
        (
            "history.embedding_dimensions",
            config.history.embedding_dimensions,
        ),
        ("context.max_chars", config.context.max_chars),
        ("context.recent_messages", config.context.recent_messages),
        ("extraction.timeout_secs", config.extraction.timeout_secs as usize),
        ("summarizer.timeout_secs", config.summarizer.timeout_secs as usize),
    ];
    for (key, value) in positive {
        if value == 0 {
            errors.push(invalid(key, "must be greater than zero"));
        }
    }

    if config.summarizer.threshold == 1 {
        errors.push(invalid(
            "summarizer.threshold",
            "must be at least 2 so rolling updates have a non-zero interval",
        ));
    }

    if config.working_memory.key_prefix.contains('*') {
        errors.push(invalid(
            "working_memory.key_prefix",
            "must not contain the scan wildcard `*`",
        ));
    }

    let backend = config.vector.backend.as_str();
    if !VECTOR_BACKENDS.contains(&backend) {
        errors.push(invalid(
            "vector.backend",
            &format!(
                "unknown backend `{backend}`, expected one of: {}",
                VECTOR_BACKENDS.join(", ")
            ),
        ));
    }
    if backend == "qdrant" && config.vector.url.trim().is_empty() {
        errors.push(invalid("vector.url", "required when vector.backend = \"qdrant\""));
    }
    if config.vector.collection.trim().is_empty() {
        errors.push(invalid("vector.collection", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn unit_interval(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(invalid(key, &format!("must be within [0, 1], got {value}")));
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Validation {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_violation() {
        let mut config = ParleyConfig::default();
        config.extraction.merge_threshold = 1.5;
        config.history.top_k = 0;
        config.vector.backend = "pinecone".into();

        let errors = validate_config(&config).expect_err("should fail");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn qdrant_requires_url() {
        let mut config = ParleyConfig::default();
        config.vector.backend = "qdrant".into();
        config.vector.url = "  ".into();

        let errors = validate_config(&config).expect_err("should fail");
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ConfigError::Validation { key, .. } if key == "vector.url"))
        );
    }

    #[test]
    fn summary_threshold_of_one_is_rejected() {
        let mut config = ParleyConfig::default();
        config.summarizer.threshold = 1;
        assert!(validate_config(&config).is_err());
    }
}
