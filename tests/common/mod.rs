//! Stub clients shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use repo_lens::config::Config;
use repo_lens::embedding::Embedder;
use repo_lens::error::{Error, Result};
use repo_lens::llm::{ChatClient, Completion, CompletionRequest};
use repo_lens::models::{IndexedUnit, MemoryItem, StoredDocument, UsageMetrics};
use repo_lens::store::{InMemoryStore, MemoryMatch, UnitMatch, VectorStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ─── Chat ───────────────────────────────────────────────────────────

type Responder = dyn Fn(usize, &CompletionRequest) -> Result<String> + Send + Sync;

/// Chat client answering from a closure of `(call index, request)`.
pub struct ScriptedChat {
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
    respond: Box<Responder>,
}

impl ScriptedChat {
    pub fn new(respond: impl Fn(usize, &CompletionRequest) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Always answers `text`.
    pub fn fixed(text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::new(move |_, _| Ok(text.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    fn model_name(&self) -> &str {
        "stub-chat"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let content = (self.respond)(index, request)?;
        Ok(Completion {
            content,
            usage: UsageMetrics {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
                model_id: "stub-chat".to_string(),
            },
        })
    }
}

/// Text of the user message of a request.
pub fn prompt_of(request: &CompletionRequest) -> &str {
    request
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

// ─── Embeddings ─────────────────────────────────────────────────────

pub const DIMS: usize = 16;

/// Deterministic bag-of-bytes embedder. Fails for text containing
/// `FAIL_EMBED`.
#[derive(Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for b in text.bytes() {
        v[b as usize % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "stub-embed"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("FAIL_EMBED") {
            return Err(Error::external("embedding", "stubbed failure", false));
        }
        Ok(hash_vector(text))
    }
}

// ─── Stores ─────────────────────────────────────────────────────────

/// In-memory store whose similarity queries always fail.
#[derive(Default)]
pub struct BrokenIndexStore {
    pub inner: InMemoryStore,
}

fn index_down() -> Error {
    Error::external("vector-store", "index unavailable", false)
}

#[async_trait]
impl VectorStore for BrokenIndexStore {
    async fn insert_unit(&self, unit: &IndexedUnit) -> Result<()> {
        self.inner.insert_unit(unit).await
    }
    async fn nearest_units(&self, _owner_id: &str, _vector: &[f32], _limit: usize) -> Result<Vec<UnitMatch>> {
        Err(index_down())
    }
    async fn recent_units(&self, owner_id: &str, limit: usize) -> Result<Vec<IndexedUnit>> {
        self.inner.recent_units(owner_id, limit).await
    }
    async fn count_units(&self, owner_id: &str) -> Result<usize> {
        self.inner.count_units(owner_id).await
    }
    async fn clear_units(&self, owner_id: &str) -> Result<usize> {
        self.inner.clear_units(owner_id).await
    }
    async fn insert_memory(&self, item: &MemoryItem) -> Result<()> {
        self.inner.insert_memory(item).await
    }
    async fn nearest_memories(&self, _owner_id: &str, _vector: &[f32], _limit: usize) -> Result<Vec<MemoryMatch>> {
        Err(index_down())
    }
    async fn save_document(&self, doc: &StoredDocument) -> Result<()> {
        self.inner.save_document(doc).await
    }
    async fn latest_document(&self, owner_id: &str, kind: &str) -> Result<Option<StoredDocument>> {
        self.inner.latest_document(owner_id, kind).await
    }
}

// ─── Config & fixtures ──────────────────────────────────────────────

/// Defaults with no inter-batch delay and immediate retries.
pub fn test_config() -> Config {
    let mut config = Config::minimal("/tmp/unused.sqlite");
    config.ingest.batch_delay_ms = 0;
    config.retry.initial_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.ingest.generate_readme = false;
    config
}

/// A document with the given `## n. Title` sections, each with real prose.
pub fn document_with(sections: &[u32]) -> String {
    let mut out = String::from("# Project\n\nIntroductory paragraph for the document.");
    for n in sections {
        out.push_str(&format!(
            "\n\n## {}. Section {}\n\nThis section explains part {} of the system in enough detail to be useful.",
            n, n, n
        ));
    }
    out
}

/// Only the given sections, without the title block.
pub fn sections_only(sections: &[u32]) -> String {
    sections
        .iter()
        .map(|n| format!("## {}. Section {}\n\nRecovered text for section {}.", n, n, n))
        .collect::<Vec<_>>()
        .join("\n\n")
}
