// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Parley.
//!
//! Provides the error type, the shared request/response types, and the
//! adapter traits for every external service the context pipeline talks to:
//! LLM providers, embedders, the expiring cache, the document store, and the
//! vector store.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ParleyError;
pub use types::{AdapterType, ChatMessage, HealthStatus, Role};

pub use traits::{
    CacheStore, DocumentStore, EmbeddingAdapter, PluginAdapter, ProviderAdapter, VectorStore,
};
