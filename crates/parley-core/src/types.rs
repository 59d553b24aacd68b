// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the context pipeline.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Cache,
    DocumentStore,
    VectorStore,
}

// --- Conversation types ---

/// Author of a conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One message of a conversation transcript as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// --- Provider types ---

/// A single message sent to an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

/// A structured generation request to an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Model identifier; providers fall back to their configured default when empty.
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Constrain the response to a single JSON object.
    #[serde(default)]
    pub json_mode: bool,
}

impl ProviderRequest {
    /// Builds a single-turn request from a user prompt.
    pub fn single(model: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: "user".to_string(),
                content: prompt.into(),
            }],
            max_tokens,
            temperature: None,
            json_mode: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A complete response from an LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    /// Concatenated text content.
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

// --- Embedding types ---

/// Input to an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

// --- Vector store types ---

/// JSON object payload attached to a vector point.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A vector with its id and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Payload,
}

/// Conjunction of exact keyword matches on payload fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFilter {
    pub must: Vec<(String, String)>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `field == value` condition.
    pub fn matches(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push((field.into(), value.into()));
        self
    }

    /// True when every condition holds for `payload`.
    pub fn accepts(&self, payload: &Payload) -> bool {
        self.must.iter().all(|(field, expected)| {
            payload
                .get(field)
                .and_then(|v| v.as_str())
                .is_some_and(|v| v == expected)
        })
    }
}

// --- Document store types ---

/// A single condition on a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    /// Top-level field equals the value.
    Eq(String, serde_json::Value),
    /// Top-level array field contains the string.
    Contains(String, String),
}

/// Conjunction of field conditions used by document queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub conditions: Vec<FieldCondition>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions
            .push(FieldCondition::Eq(field.into(), value.into()));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(FieldCondition::Contains(field.into(), value.into()));
        self
    }

    /// Evaluates the filter against an in-memory document.
    pub fn accepts(&self, doc: &serde_json::Value) -> bool {
        self.conditions.iter().all(|cond| match cond {
            FieldCondition::Eq(field, expected) => doc.get(field) == Some(expected),
            FieldCondition::Contains(field, needle) => doc
                .get(field)
                .and_then(|v| v.as_array())
                .is_some_and(|items| items.iter().any(|i| i.as_str() == Some(needle.as_str()))),
        })
    }
}
