// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Parley.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Anthropic API settings used by fact extraction and summarization.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// SQLite document store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-session working memory settings.
    #[serde(default)]
    pub working_memory: WorkingMemoryConfig,

    /// Durable user profile settings.
    #[serde(default)]
    pub profiles: ProfileConfig,

    /// LLM fact extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Conversation summarization settings.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Semantic history search settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Vector store backend settings.
    #[serde(default)]
    pub vector: VectorConfig,

    /// Local embedding model settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Prompt context assembly settings.
    #[serde(default)]
    pub context: ContextConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and the shell prompt.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Anthropic API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used when a component does not name its own.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file holding user profiles.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Working memory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkingMemoryConfig {
    /// Seconds a session survives after its last read or write.
    #[serde(default = "default_wm_ttl")]
    pub ttl_secs: u64,

    /// Number of intent records retained per session.
    #[serde(default = "default_max_intents")]
    pub max_intents: usize,

    /// Prefix for session keys in the cache.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_wm_ttl(),
            max_intents: default_max_intents(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_wm_ttl() -> u64 {
    86_400
}

fn default_max_intents() -> usize {
    20
}

fn default_key_prefix() -> String {
    "wm".to_string()
}

/// User profile configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Number of session summaries retained per profile.
    #[serde(default = "default_max_session_summaries")]
    pub max_session_summaries: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_session_summaries: default_max_session_summaries(),
        }
    }
}

fn default_max_session_summaries() -> usize {
    20
}

/// Fact extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Model for extraction calls. `None` uses `anthropic.default_model`.
    #[serde(default)]
    pub model: Option<String>,

    /// Token budget for one extraction response.
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    /// Minimum confidence for a fact to be merged in a live turn.
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f64,

    /// Minimum confidence for batch extraction over a full history.
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: default_extraction_max_tokens(),
            timeout_secs: default_extraction_timeout(),
            merge_threshold: default_merge_threshold(),
            batch_threshold: default_batch_threshold(),
        }
    }
}

fn default_extraction_max_tokens() -> u32 {
    500
}

fn default_extraction_timeout() -> u64 {
    12
}

fn default_merge_threshold() -> f64 {
    0.7
}

fn default_batch_threshold() -> f64 {
    0.6
}

/// Conversation summarizer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizerConfig {
    /// Model for summarization calls. `None` uses `anthropic.default_model`.
    #[serde(default)]
    pub model: Option<String>,

    /// Token budget for one summary response.
    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,

    /// Message count at which the first summary is produced.
    /// Rolling updates follow every `threshold / 2` new messages.
    #[serde(default = "default_summary_threshold")]
    pub threshold: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: default_summary_max_tokens(),
            timeout_secs: default_summary_timeout(),
            threshold: default_summary_threshold(),
        }
    }
}

fn default_summary_max_tokens() -> u32 {
    1000
}

fn default_summary_timeout() -> u64 {
    15
}

fn default_summary_threshold() -> usize {
    20
}

/// Semantic history search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Maximum number of past conversations returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for a past conversation to be returned.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Embedding dimensionality declared for the collection.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_min_score() -> f32 {
    0.5
}

fn default_embedding_dimensions() -> usize {
    384
}

/// Vector store backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VectorConfig {
    /// Backend name: `memory` or `qdrant`.
    #[serde(default = "default_vector_backend")]
    pub backend: String,

    /// Qdrant gRPC endpoint.
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Qdrant API key, if the server requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Collection holding conversation summaries.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_qdrant_url(),
            api_key: None,
            collection: default_collection(),
        }
    }
}

fn default_vector_backend() -> String {
    "memory".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection() -> String {
    "conversation_summaries".to_string()
}

/// Local embedding model configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Directory for downloaded model files. `None` uses the platform data dir.
    #[serde(default)]
    pub model_dir: Option<String>,
}

/// Prompt context assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Character budget for the assembled prompt context.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Number of trailing messages returned in the bundle.
    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,

    /// Soft latency budget for one context build, in milliseconds.
    #[serde(default = "default_latency_budget_ms")]
    pub latency_budget_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            recent_messages: default_recent_messages(),
            latency_budget_ms: default_latency_budget_ms(),
        }
    }
}

fn default_max_chars() -> usize {
    4000
}

fn default_recent_messages() -> usize {
    10
}

fn default_latency_budget_ms() -> u64 {
    800
}
