//! Ingestion pipeline: summarize, embed, and persist a repository's files.
//!
//! Files are processed in fixed-size batches. Within a batch every file
//! runs concurrently and settles independently: a failed summary, embedding
//! or insert is recorded against that file and never cancels its siblings.
//! Batches run sequentially with a fixed delay between them.
//!
//! Re-ingestion is a full reset: the owner's previous units are cleared
//! before any new unit is written.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::{Error, RecordedError, Result};
use crate::llm::{ChatClient, CompletionRequest};
use crate::models::{IndexedUnit, SourceFile};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::VectorStore;
use crate::text::truncate_chars;

const SUMMARY_SYSTEM: &str = "You summarize source files for a code search index. \
Describe the file's purpose, its main types and functions, and how it relates to the rest \
of the project. Answer in at most 6 sentences of plain prose.";

const SUMMARY_MAX_TOKENS: u32 = 400;

/// Aggregate outcome of an ingestion run. Per-file failures are reported
/// here, never raised.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_processed: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub errors: Vec<RecordedError>,
    /// Set by the repository-level flow when the follow-up README pass
    /// produced a complete document.
    pub readme_generated: bool,
}

/// Tunables for [`IngestPipeline`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_file_chars: usize,
    pub llm_retry: RetryPolicy,
    pub embedding_retry: RetryPolicy,
}

pub struct IngestPipeline {
    chat: Arc<dyn ChatClient>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    options: IngestOptions,
}

impl IngestPipeline {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        options: IngestOptions,
    ) -> Self {
        Self {
            chat,
            embedder,
            store,
            options,
        }
    }

    /// Replace the owner's index with one unit per file in `files`.
    ///
    /// Fails with [`Error::NotFound`] before touching the store when
    /// `files` is empty.
    pub async fn ingest(&self, owner_id: &str, files: &[SourceFile]) -> Result<IngestReport> {
        if files.is_empty() {
            return Err(Error::NotFound(format!(
                "no files to ingest for project '{}'",
                owner_id
            )));
        }

        let removed = self.store.clear_units(owner_id).await?;
        if removed > 0 {
            info!(project = owner_id, removed, "cleared previous index");
        }

        let batch_size = self.options.batch_size.max(1);
        let batch_count = files.len().div_ceil(batch_size);
        let mut report = IngestReport {
            files_processed: files.len(),
            ..Default::default()
        };

        for (index, batch) in files.chunks(batch_size).enumerate() {
            if index > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let outcomes = join_all(batch.iter().map(|file| self.ingest_file(owner_id, file))).await;

            for (file, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => report.success_count += 1,
                    Err(err) => {
                        warn!(project = owner_id, path = %file.path, error = %err, "skipping file");
                        report.fail_count += 1;
                        report.errors.push(RecordedError::new(&file.path, &err));
                    }
                }
            }

            info!(
                project = owner_id,
                batch = index + 1,
                batches = batch_count,
                ok = report.success_count,
                failed = report.fail_count,
                "batch complete"
            );
        }

        Ok(report)
    }

    async fn ingest_file(&self, owner_id: &str, file: &SourceFile) -> Result<()> {
        let content = truncate_chars(&file.content, self.options.max_file_chars);

        let request = CompletionRequest::new(format!("File: {}\n\n{}", file.path, content))
            .with_system(SUMMARY_SYSTEM)
            .with_max_tokens(SUMMARY_MAX_TOKENS);
        let summary = run_with_retry(&self.options.llm_retry, "llm", || self.chat.complete(&request))
            .await?
            .content
            .trim()
            .to_string();

        if summary.is_empty() {
            return Err(Error::external("llm", "empty summary", false));
        }

        let embed_text = format!("{}\n{}", file.path, summary);
        let embedding = run_with_retry(&self.options.embedding_retry, "embedding", || {
            self.embedder.embed(&embed_text)
        })
        .await?;

        let unit = IndexedUnit {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            path: file.path.clone(),
            raw_content: content.to_string(),
            summary_text: summary,
            embedding,
            created_at: Utc::now(),
        };

        self.store.insert_unit(&unit).await
    }
}
