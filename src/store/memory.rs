//! In-memory [`VectorStore`] implementation for tests and embedding hosts.
//!
//! Uses `Vec`s behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over every stored vector of the owner.

use std::sync::RwLock;

use async_trait::async_trait;

use super::{rank_by_similarity, MemoryMatch, UnitMatch, VectorStore};
use crate::embedding::unit_similarity;
use crate::error::{Error, Result};
use crate::models::{IndexedUnit, MemoryItem, StoredDocument};

/// In-memory store. Rows are kept in insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    units: RwLock<Vec<IndexedUnit>>,
    memories: RwLock<Vec<MemoryItem>>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::external("vector-store", "in-memory store lock poisoned", false)
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert_unit(&self, unit: &IndexedUnit) -> Result<()> {
        self.units.write().map_err(|_| poisoned())?.push(unit.clone());
        Ok(())
    }

    async fn nearest_units(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<UnitMatch>> {
        let units = self.units.read().map_err(|_| poisoned())?;
        let scored = units
            .iter()
            .filter(|u| u.owner_id == owner_id)
            .map(|u| (u.clone(), unit_similarity(vector, &u.embedding)))
            .collect();

        Ok(rank_by_similarity(scored, limit)
            .into_iter()
            .map(|(unit, similarity)| UnitMatch { unit, similarity })
            .collect())
    }

    async fn recent_units(&self, owner_id: &str, limit: usize) -> Result<Vec<IndexedUnit>> {
        let units = self.units.read().map_err(|_| poisoned())?;
        let mut owned: Vec<IndexedUnit> = units
            .iter()
            .rev()
            .filter(|u| u.owner_id == owner_id)
            .cloned()
            .collect();
        // Reversed insertion order, so a stable sort leaves newer inserts first on ties.
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn count_units(&self, owner_id: &str) -> Result<usize> {
        let units = self.units.read().map_err(|_| poisoned())?;
        Ok(units.iter().filter(|u| u.owner_id == owner_id).count())
    }

    async fn clear_units(&self, owner_id: &str) -> Result<usize> {
        let mut units = self.units.write().map_err(|_| poisoned())?;
        let before = units.len();
        units.retain(|u| u.owner_id != owner_id);
        Ok(before - units.len())
    }

    async fn insert_memory(&self, item: &MemoryItem) -> Result<()> {
        self.memories.write().map_err(|_| poisoned())?.push(item.clone());
        Ok(())
    }

    async fn nearest_memories(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<MemoryMatch>> {
        let memories = self.memories.read().map_err(|_| poisoned())?;
        let scored = memories
            .iter()
            .filter(|m| m.owner_id == owner_id)
            .map(|m| (m.clone(), unit_similarity(vector, &m.embedding)))
            .collect();

        Ok(rank_by_similarity(scored, limit)
            .into_iter()
            .map(|(item, similarity)| MemoryMatch { item, similarity })
            .collect())
    }

    async fn save_document(&self, doc: &StoredDocument) -> Result<()> {
        self.documents.write().map_err(|_| poisoned())?.push(doc.clone());
        Ok(())
    }

    async fn latest_document(&self, owner_id: &str, kind: &str) -> Result<Option<StoredDocument>> {
        let documents = self.documents.read().map_err(|_| poisoned())?;
        Ok(documents
            .iter()
            .rev()
            .find(|d| d.owner_id == owner_id && d.kind == kind)
            .cloned())
    }
}
