//! Top-level wiring: one [`Lens`] owns the clients and the store and exposes
//! the operations the CLI (or any embedding host) calls.
//!
//! Clients are constructed once and shared by reference across the
//! pipelines. [`Lens::open`] builds everything from a [`Config`];
//! [`Lens::new`] takes ready-made clients for tests and other hosts.

use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::diff::{DiffAnalyzer, DiffReport};
use crate::docgen::template::{self, DocumentTemplate};
use crate::docgen::{DocumentGenerator, GeneratedDocument};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, RecordedError, Result};
use crate::ingest::{IngestOptions, IngestPipeline, IngestReport};
use crate::llm::{create_chat_client, ChatClient};
use crate::loader::RepositoryLoader;
use crate::memory::MemoryService;
use crate::migrate;
use crate::models::{SearchHit, SourceFile, StoredDocument};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::search::{RetrievalEngine, SearchResults};
use crate::store::{SqliteStore, VectorStore};
use crate::text::truncate_chars;

/// Query used to pull grounding facts for whole-repository documents.
const OVERVIEW_QUERY: &str = "project overview: purpose, architecture, main components, entry points, configuration";

const LOADER_TIMEOUT: Duration = Duration::from_secs(600);
const FACT_SUMMARY_CHARS: usize = 1_200;

pub struct Lens {
    store: Arc<dyn VectorStore>,
    ingest: IngestPipeline,
    retrieval: Arc<RetrievalEngine>,
    memory: Arc<MemoryService>,
    diff: DiffAnalyzer,
    generator: DocumentGenerator,
    loader_retry: RetryPolicy,
    retrieval_limit: usize,
    generate_readme: bool,
}

impl Lens {
    pub fn new(
        config: &Config,
        chat: Arc<dyn ChatClient>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let llm_retry = config.llm_retry();
        let embedding_retry = config.embedding_retry();

        let retrieval = Arc::new(RetrievalEngine::new(
            embedder.clone(),
            store.clone(),
            embedding_retry.clone(),
        ));
        let memory = Arc::new(MemoryService::new(
            chat.clone(),
            embedder.clone(),
            store.clone(),
            llm_retry.clone(),
            embedding_retry.clone(),
        ));

        let ingest = IngestPipeline::new(
            chat.clone(),
            embedder.clone(),
            store.clone(),
            IngestOptions {
                batch_size: config.ingest.batch_size,
                batch_delay: Duration::from_millis(config.ingest.batch_delay_ms),
                max_file_chars: config.ingest.max_file_chars,
                llm_retry: llm_retry.clone(),
                embedding_retry: embedding_retry.clone(),
            },
        );

        let diff = DiffAnalyzer::new(
            chat.clone(),
            embedder,
            retrieval.clone(),
            memory.clone(),
            config.retrieval.limit,
            config.retrieval.memory_limit,
            llm_retry.clone(),
            embedding_retry,
        );

        Self {
            generator: DocumentGenerator::new(chat, config.generation.clone(), llm_retry.clone()),
            loader_retry: llm_retry.with_timeout(LOADER_TIMEOUT),
            retrieval_limit: config.retrieval.limit,
            generate_readme: config.ingest.generate_readme,
            store,
            ingest,
            retrieval,
            memory,
            diff,
        }
    }

    /// Connect to the configured database, apply migrations, and build the
    /// configured clients.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await.context("applying migrations")?;

        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_client(&config.llm)?;
        let store: Arc<dyn VectorStore> = Arc::new(SqliteStore::new(pool));

        Ok(Self::new(config, chat, embedder, store))
    }

    pub async fn ingest(&self, owner_id: &str, files: &[SourceFile]) -> Result<IngestReport> {
        self.ingest.ingest(owner_id, files).await
    }

    /// Load, ingest, then attempt a README. The README pass never fails the
    /// ingestion.
    pub async fn ingest_repository(&self, owner_id: &str, loader: &dyn RepositoryLoader) -> Result<IngestReport> {
        info!(project = owner_id, source = %loader.describe(), "loading repository");
        let files = run_with_retry(&self.loader_retry, "repository-loader", || loader.load()).await?;
        if files.is_empty() {
            return Err(Error::NotFound(format!(
                "no matching files in {}",
                loader.describe()
            )));
        }

        let mut report = self.ingest.ingest(owner_id, &files).await?;
        info!(
            project = owner_id,
            ok = report.success_count,
            failed = report.fail_count,
            "ingestion finished"
        );

        if self.generate_readme && report.success_count > 0 {
            match self.generate_document(owner_id, template::README.name, owner_id).await {
                Ok(_) => report.readme_generated = true,
                Err(err) => warn!(project = owner_id, error = %err, "README generation failed"),
            }
        }

        Ok(report)
    }

    pub async fn search(&self, owner_id: &str, query: &str, limit: Option<usize>) -> Result<SearchResults> {
        let limit = limit.unwrap_or(self.retrieval_limit);
        self.retrieval.search(owner_id, query, limit).await
    }

    pub async fn analyze_diff(&self, owner_id: &str, raw_diff: &str) -> Result<DiffReport> {
        self.diff.analyze(owner_id, raw_diff).await
    }

    pub async fn remember(
        &self,
        owner_id: &str,
        question: &str,
        answer: &str,
    ) -> Vec<std::result::Result<(), RecordedError>> {
        self.memory.remember(owner_id, question, answer).await
    }

    /// Generate a complete document from the project's index and persist it.
    pub async fn generate_document(&self, owner_id: &str, template_name: &str, subject: &str) -> Result<GeneratedDocument> {
        let template = resolve_template(template_name)?;
        let facts = self.grounding_facts(owner_id).await?;

        let generated = self.generator.generate(template, subject, &facts).await?;
        self.persist(owner_id, template, &generated).await?;
        info!(
            project = owner_id,
            document = template.name,
            calls = generated.model_calls,
            tokens = generated.usage.total_tokens,
            "document generated"
        );
        Ok(generated)
    }

    /// Apply `instruction` to the latest stored document of this kind.
    pub async fn modify_document(&self, owner_id: &str, template_name: &str, instruction: &str) -> Result<GeneratedDocument> {
        let template = resolve_template(template_name)?;
        let original = self
            .store
            .latest_document(owner_id, template.name)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "no {} document for project '{}'",
                    template.name, owner_id
                ))
            })?;

        let modified = self.generator.modify(template, &original.content, instruction).await?;
        self.persist(owner_id, template, &modified).await?;
        Ok(modified)
    }

    pub async fn latest_document(&self, owner_id: &str, template_name: &str) -> Result<Option<StoredDocument>> {
        let template = resolve_template(template_name)?;
        self.store.latest_document(owner_id, template.name).await
    }

    async fn persist(&self, owner_id: &str, template: &DocumentTemplate, generated: &GeneratedDocument) -> Result<()> {
        let doc = StoredDocument {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            kind: template.name.to_string(),
            content: generated.draft.content.clone(),
            created_at: Utc::now(),
        };
        self.store.save_document(&doc).await
    }

    /// Summaries of the units most related to a project overview, falling
    /// back to the most recent units when search is unavailable.
    async fn grounding_facts(&self, owner_id: &str) -> Result<String> {
        let hits = match self.retrieval.search(owner_id, OVERVIEW_QUERY, self.retrieval_limit).await {
            Ok(results) => results.hits,
            Err(err @ Error::NotFound(_)) => return Err(err),
            Err(err) => {
                warn!(project = owner_id, error = %err, "overview search failed, using recent units");
                let units = self.store.recent_units(owner_id, self.retrieval_limit).await?;
                if units.is_empty() {
                    return Err(Error::NotFound(format!(
                        "no indexed content for project '{}'",
                        owner_id
                    )));
                }
                units
                    .into_iter()
                    .map(|u| SearchHit {
                        path: u.path,
                        content: u.raw_content,
                        summary: u.summary_text,
                        similarity: 0.0,
                    })
                    .collect()
            }
        };

        Ok(hits
            .iter()
            .map(|hit| format!("### {}\n{}", hit.path, truncate_chars(&hit.summary, FACT_SUMMARY_CHARS)))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn resolve_template(name: &str) -> Result<&'static DocumentTemplate> {
    template::template_by_name(name).ok_or_else(|| {
        let known: Vec<&str> = template::ALL.iter().map(|t| t.name).collect();
        Error::Validation(format!(
            "unknown document template '{}'; available: {}",
            name,
            known.join(", ")
        ))
    })
}
