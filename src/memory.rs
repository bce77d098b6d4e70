//! Memory subsystem: durable facts distilled from question/answer exchanges.
//!
//! Memory is an enrichment signal, never a hard dependency. Extraction
//! yields an empty list on any model or parse failure, storage records a
//! per-item outcome without stopping at the first failure, and recall
//! returns nothing when the store is unavailable.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{RecordedError, Result};
use crate::llm::extract::parse_array;
use crate::llm::{ChatClient, CompletionRequest};
use crate::models::{ExtractedFact, MemoryItem, MemoryKind};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::VectorStore;

/// Upper bound on facts kept from a single exchange.
pub const MAX_FACTS: usize = 5;

const DEFAULT_RELEVANCE: f64 = 1.0;

const EXTRACTION_SYSTEM: &str = "You extract durable knowledge about a software project from a \
conversation. Return ONLY a JSON array with at most 5 items. Each item is an object \
{\"kind\": \"concept\" | \"decision\" | \"relationship\", \"content\": \"one self-contained sentence\"}. \
Return [] when nothing is worth remembering.";

pub struct MemoryService {
    chat: Arc<dyn ChatClient>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm_retry: RetryPolicy,
    embedding_retry: RetryPolicy,
}

impl MemoryService {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm_retry: RetryPolicy,
        embedding_retry: RetryPolicy,
    ) -> Self {
        Self {
            chat,
            embedder,
            store,
            llm_retry,
            embedding_retry,
        }
    }

    pub async fn extract(&self, question: &str, answer: &str) -> Vec<ExtractedFact> {
        let request = CompletionRequest::new(format!("Question:\n{}\n\nAnswer:\n{}", question, answer))
            .with_system(EXTRACTION_SYSTEM)
            .with_max_tokens(600);

        match run_with_retry(&self.llm_retry, "llm", || self.chat.complete(&request)).await {
            Ok(completion) => parse_facts(&completion.content),
            Err(err) => {
                warn!(error = %err, "memory extraction failed");
                Vec::new()
            }
        }
    }

    /// Embed and persist each fact independently.
    pub async fn store(&self, owner_id: &str, facts: &[ExtractedFact]) -> Vec<std::result::Result<(), RecordedError>> {
        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            let outcome = self.store_one(owner_id, fact).await.map_err(|err| {
                warn!(project = owner_id, kind = fact.kind.as_str(), error = %err, "failed to store memory item");
                RecordedError::new(&fact.content, &err)
            });
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn store_one(&self, owner_id: &str, fact: &ExtractedFact) -> Result<()> {
        let embedding = run_with_retry(&self.embedding_retry, "embedding", || {
            self.embedder.embed(&fact.content)
        })
        .await?;

        let item = MemoryItem {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind: fact.kind,
            content: fact.content.clone(),
            embedding,
            relevance_score: DEFAULT_RELEVANCE,
            created_at: Utc::now(),
        };
        self.store.insert_memory(&item).await
    }

    /// Nearest memory items for `vector`. Empty on an empty vector or a
    /// store failure.
    pub async fn recall(&self, owner_id: &str, vector: &[f32], limit: usize) -> Vec<MemoryItem> {
        if vector.is_empty() || limit == 0 {
            return Vec::new();
        }

        match self.store.nearest_memories(owner_id, vector, limit).await {
            Ok(matches) => matches.into_iter().map(|m| m.item).collect(),
            Err(err) => {
                warn!(project = owner_id, error = %err, "memory recall failed");
                Vec::new()
            }
        }
    }

    /// Extract facts from one exchange and store them.
    pub async fn remember(
        &self,
        owner_id: &str,
        question: &str,
        answer: &str,
    ) -> Vec<std::result::Result<(), RecordedError>> {
        let facts = self.extract(question, answer).await;
        debug!(project = owner_id, facts = facts.len(), "extracted memory facts");
        self.store(owner_id, &facts).await
    }
}

/// Lenient fact parsing: unknown kinds and blank contents are dropped,
/// at most [`MAX_FACTS`] survive.
pub fn parse_facts(text: &str) -> Vec<ExtractedFact> {
    let Some(items) = parse_array(text) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let kind = obj
                .get("kind")
                .or_else(|| obj.get("type"))
                .and_then(Value::as_str)
                .and_then(MemoryKind::parse)?;
            let content = obj.get("content").and_then(Value::as_str)?.trim();
            if content.is_empty() {
                return None;
            }
            Some(ExtractedFact {
                kind,
                content: content.to_string(),
            })
        })
        .take(MAX_FACTS)
        .collect()
}
