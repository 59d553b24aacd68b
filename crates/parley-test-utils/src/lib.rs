// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without an LLM, an embedding model, or external stores.
//!
//! # Components
//!
//! - [`MockProvider`] - LLM provider replaying queued responses
//! - [`MockEmbedder`] - bag-of-words embedder with stable similarities
//! - [`FailingCache`], [`FailingDocumentStore`], [`FailingVectorStore`] - stores that always error
//! - [`TestHarness`] - a wired [`ContextManager`](parley_context::ContextManager)

pub mod failing;
pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use failing::{FailingCache, FailingDocumentStore, FailingVectorStore};
pub use harness::{TestHarness, TestHarnessBuilder, TEST_BOT, TEST_TENANT};
pub use mock_embedder::MockEmbedder;
pub use mock_provider::MockProvider;
