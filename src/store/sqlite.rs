//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs. Similarity search loads
//! the owner's vectors and ranks them in Rust with cosine similarity, in
//! `rowid` (insertion) order so ties stay deterministic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{rank_by_similarity, MemoryMatch, UnitMatch, VectorStore};
use crate::embedding::{blob_to_vec, unit_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{IndexedUnit, MemoryItem, MemoryKind, StoredDocument};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn unit_from_row(row: &SqliteRow) -> IndexedUnit {
    let blob: Vec<u8> = row.get("embedding");
    IndexedUnit {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        path: row.get("path"),
        raw_content: row.get("raw_content"),
        summary_text: row.get("summary_text"),
        embedding: blob_to_vec(&blob),
        created_at: from_millis(row.get("created_at")),
    }
}

fn memory_from_row(row: &SqliteRow) -> Result<MemoryItem> {
    let kind: String = row.get("kind");
    let blob: Vec<u8> = row.get("embedding");
    Ok(MemoryItem {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        kind: MemoryKind::parse(&kind)
            .ok_or_else(|| Error::external("vector-store", format!("unknown memory kind '{}'", kind), false))?,
        content: row.get("content"),
        embedding: blob_to_vec(&blob),
        relevance_score: row.get("relevance_score"),
        created_at: from_millis(row.get("created_at")),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert_unit(&self, unit: &IndexedUnit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexed_units (id, owner_id, path, raw_content, summary_text, embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&unit.id)
        .bind(&unit.owner_id)
        .bind(&unit.path)
        .bind(&unit.raw_content)
        .bind(&unit.summary_text)
        .bind(vec_to_blob(&unit.embedding))
        .bind(unit.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn nearest_units(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<UnitMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, path, raw_content, summary_text, embedding, created_at
            FROM indexed_units
            WHERE owner_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let unit = unit_from_row(row);
                let similarity = unit_similarity(vector, &unit.embedding);
                (unit, similarity)
            })
            .collect();

        Ok(rank_by_similarity(scored, limit)
            .into_iter()
            .map(|(unit, similarity)| UnitMatch { unit, similarity })
            .collect())
    }

    async fn recent_units(&self, owner_id: &str, limit: usize) -> Result<Vec<IndexedUnit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, path, raw_content, summary_text, embedding, created_at
            FROM indexed_units
            WHERE owner_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    async fn count_units(&self, owner_id: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_units WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn clear_units(&self, owner_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM indexed_units WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn insert_memory(&self, item: &MemoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO memory_items (id, owner_id, kind, content, embedding, relevance_score, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.owner_id)
        .bind(item.kind.as_str())
        .bind(&item.content)
        .bind(vec_to_blob(&item.embedding))
        .bind(item.relevance_score)
        .bind(item.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn nearest_memories(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<Vec<MemoryMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, kind, content, embedding, relevance_score, created_at
            FROM memory_items
            WHERE owner_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let item = memory_from_row(row)?;
            let similarity = unit_similarity(vector, &item.embedding);
            scored.push((item, similarity));
        }

        Ok(rank_by_similarity(scored, limit)
            .into_iter()
            .map(|(item, similarity)| MemoryMatch { item, similarity })
            .collect())
    }

    async fn save_document(&self, doc: &StoredDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, owner_id, kind, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.owner_id)
        .bind(&doc.kind)
        .bind(&doc.content)
        .bind(doc.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_document(&self, owner_id: &str, kind: &str) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, kind, content, created_at
            FROM documents
            WHERE owner_id = ? AND kind = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredDocument {
            id: r.get("id"),
            owner_id: r.get("owner_id"),
            kind: r.get("kind"),
            content: r.get("content"),
            created_at: from_millis(r.get("created_at")),
        }))
    }
}
