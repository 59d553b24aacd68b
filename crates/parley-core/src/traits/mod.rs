// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cache;
pub mod document;
pub mod embedding;
pub mod provider;
pub mod vector;

pub use adapter::PluginAdapter;
pub use cache::CacheStore;
pub use document::DocumentStore;
pub use embedding::EmbeddingAdapter;
pub use provider::ProviderAdapter;
pub use vector::VectorStore;
