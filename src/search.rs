//! Retrieval engine: semantic search over indexed units.
//!
//! The query is embedded and compared against the owner's stored vectors.
//! When the vector query itself fails, the engine falls back to the most
//! recently created units with similarity fixed at 0 and marks the result
//! as degraded. An owner with no units at all is a [`Error::NotFound`],
//! kept distinct from a temporarily failing index.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{IndexedUnit, SearchHit};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::VectorStore;

/// Ordered hits plus whether they came from the recency fallback.
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub degraded: bool,
}

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    retry: RetryPolicy,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, retry: RetryPolicy) -> Self {
        Self {
            embedder,
            store,
            retry,
        }
    }

    /// Embed `query` and return the `limit` most similar units of `owner_id`.
    ///
    /// Embedding failure propagates; there is nothing to degrade around
    /// without a query vector.
    pub async fn search(&self, owner_id: &str, query: &str, limit: usize) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Err(Error::Validation("search query is empty".to_string()));
        }
        check_limit(limit)?;

        let vector = run_with_retry(&self.retry, "embedding", || self.embedder.embed(query)).await?;
        self.search_by_vector(owner_id, &vector, limit).await
    }

    /// Search with an already computed query vector.
    ///
    /// An empty result from the store means the owner has nothing indexed,
    /// so `limit` must be at least 1.
    pub async fn search_by_vector(&self, owner_id: &str, vector: &[f32], limit: usize) -> Result<SearchResults> {
        check_limit(limit)?;
        match self.store.nearest_units(owner_id, vector, limit).await {
            Ok(matches) if matches.is_empty() => Err(not_indexed(owner_id)),
            Ok(matches) => {
                debug!(project = owner_id, hits = matches.len(), "vector search");
                Ok(SearchResults {
                    hits: matches
                        .into_iter()
                        .map(|m| to_hit(m.unit, m.similarity))
                        .collect(),
                    degraded: false,
                })
            }
            Err(err) => {
                warn!(project = owner_id, error = %err, "vector search failed, falling back to recent units");
                self.recent(owner_id, limit).await
            }
        }
    }

    async fn recent(&self, owner_id: &str, limit: usize) -> Result<SearchResults> {
        let units = self.store.recent_units(owner_id, limit).await?;
        if units.is_empty() {
            return Err(not_indexed(owner_id));
        }

        Ok(SearchResults {
            hits: units.into_iter().map(|u| to_hit(u, 0.0)).collect(),
            degraded: true,
        })
    }
}

fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(Error::Validation("search limit must be at least 1".to_string()));
    }
    Ok(())
}

fn not_indexed(owner_id: &str) -> Error {
    Error::NotFound(format!("no indexed content for project '{}'", owner_id))
}

fn to_hit(unit: IndexedUnit, similarity: f32) -> SearchHit {
    SearchHit {
        path: unit.path,
        content: unit.raw_content,
        summary: unit.summary_text,
        similarity,
    }
}
