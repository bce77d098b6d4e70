//! Storage abstraction for repo-lens.
//!
//! The [`VectorStore`] trait defines every persistence operation the
//! pipelines need: indexed units, memory items, and generated documents.
//! Vectors are compared with cosine similarity; all queries are scoped to
//! an owner (project) id.
//!
//! Implementations must be `Send + Sync` to be shared across the
//! concurrent ingestion fan-out.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{IndexedUnit, MemoryItem, StoredDocument};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A stored unit paired with its similarity to the query vector.
#[derive(Debug, Clone)]
pub struct UnitMatch {
    pub unit: IndexedUnit,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct MemoryMatch {
    pub item: MemoryItem,
    pub similarity: f32,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_unit`](VectorStore::insert_unit) | Persist one indexed unit |
/// | [`nearest_units`](VectorStore::nearest_units) | Similarity-ordered units for an owner |
/// | [`recent_units`](VectorStore::recent_units) | Newest units first |
/// | [`count_units`](VectorStore::count_units) | Number of units for an owner |
/// | [`clear_units`](VectorStore::clear_units) | Full reset before re-ingestion |
/// | [`insert_memory`](VectorStore::insert_memory) | Persist one memory item |
/// | [`nearest_memories`](VectorStore::nearest_memories) | Similarity-ordered memory items |
/// | [`save_document`](VectorStore::save_document) | Persist a generated document |
/// | [`latest_document`](VectorStore::latest_document) | Newest document of a kind |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert_unit(&self, unit: &IndexedUnit) -> Result<()>;

    /// Units ordered by descending similarity; equal similarities keep
    /// insertion order.
    async fn nearest_units(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<UnitMatch>>;

    /// Units ordered by `created_at` descending, newest insert first on ties.
    async fn recent_units(&self, owner_id: &str, limit: usize) -> Result<Vec<IndexedUnit>>;

    async fn count_units(&self, owner_id: &str) -> Result<usize>;

    /// Delete all units for an owner. Returns the number removed.
    async fn clear_units(&self, owner_id: &str) -> Result<usize>;

    async fn insert_memory(&self, item: &MemoryItem) -> Result<()>;

    async fn nearest_memories(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<MemoryMatch>>;

    async fn save_document(&self, doc: &StoredDocument) -> Result<()>;

    async fn latest_document(&self, owner_id: &str, kind: &str) -> Result<Option<StoredDocument>>;
}

/// Stable descending sort by similarity, then truncate.
pub(crate) fn rank_by_similarity<T>(mut scored: Vec<(T, f32)>, limit: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}
