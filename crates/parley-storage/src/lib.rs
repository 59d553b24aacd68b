// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backends for the external services the context pipeline consumes.
//!
//! - [`MemoryCache`]: expiring key-value store behind working memory.
//! - [`SqliteDocumentStore`] / [`MemoryDocumentStore`]: JSON documents behind
//!   user profiles. The SQLite store runs refinery migrations on open and
//!   serializes writes through `tokio-rusqlite`.
//! - [`QdrantVectorStore`] / [`MemoryVectorStore`]: cosine similarity search
//!   behind semantic history.

pub mod cache;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod queries;
pub mod sqlite;
pub mod vector;

pub use cache::MemoryCache;
pub use database::Database;
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use vector::{MemoryVectorStore, QdrantVectorStore};
