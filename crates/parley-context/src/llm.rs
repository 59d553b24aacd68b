// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded JSON completions against an optional provider.

use std::sync::Arc;
use std::time::Duration;

use parley_core::types::ProviderRequest;
use parley_core::{ParleyError, ProviderAdapter};
use serde_json::{Map, Value};

/// Sends a JSON-mode request with a hard timeout and returns the parsed object.
///
/// An absent provider is reported as a provider error so callers take their
/// usual degraded path.
pub(crate) async fn complete_json(
    provider: Option<&Arc<dyn ProviderAdapter>>,
    request: ProviderRequest,
    timeout: Duration,
) -> Result<Map<String, Value>, ParleyError> {
    let provider =
        provider.ok_or_else(|| ParleyError::provider("no LLM provider configured"))?;

    let response = tokio::time::timeout(timeout, provider.complete(request.json()))
        .await
        .map_err(|_| ParleyError::Timeout { duration: timeout })??;

    extract_json_object(&response.content).ok_or_else(|| {
        ParleyError::provider(format!(
            "response is not a JSON object: {}",
            preview(&response.content)
        ))
    })
}

/// Pulls the outermost JSON object out of model output, tolerating code
/// fences and chatter around it.
pub(crate) fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Reads a string-ish field, accepting numbers and booleans.
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
