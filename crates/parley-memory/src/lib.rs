// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session memory, user profiles, and semantic conversation history.
//!
//! - [`WorkingMemory`]: TTL-bounded per-session state over a [`CacheStore`](parley_core::CacheStore)
//! - [`ProfileManager`]: durable cross-session identities over a [`DocumentStore`](parley_core::DocumentStore)
//! - [`SemanticHistorySearch`]: summaries of finished sessions in a [`VectorStore`](parley_core::VectorStore)
//! - [`EmbedderFactory`]: lazily-loaded local ONNX embeddings

pub mod embedder;
pub mod factory;
pub mod facts;
pub mod history;
pub mod model_manager;
pub mod profile;
pub mod types;
pub mod working;

pub use embedder::{OnnxEmbedder, EMBEDDING_DIM};
pub use factory::EmbedderFactory;
pub use facts::merge_facts;
pub use history::{recency_label, vector_id, SemanticHistorySearch};
pub use model_manager::ModelManager;
pub use profile::{Identifiers, ProfileManager, PROFILES_COLLECTION};
pub use types::*;
pub use working::WorkingMemory;
