//! Diff analyzer: unified diff in, structured risk report out.
//!
//! The flow is strictly sequential per request:
//!
//! ```text
//! parse → embed query → retrieve code → recall memory → assemble prompt
//!       → generate → extract JSON → validate
//! ```
//!
//! Only a failed model call propagates. A failed query embedding degrades
//! to an empty vector (no code or memory context), and a malformed model
//! response degrades to a report built from the raw output.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::extract::{parse_object, ModelJson};
use crate::llm::{ChatClient, CompletionRequest};
use crate::memory::MemoryService;
use crate::models::{DiffFile, MemoryItem, SearchHit, UsageMetrics};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::search::RetrievalEngine;
use crate::text::{truncate_chars, truncate_with_marker};

/// Path given to input that carries no diff markers.
pub const PASTED_CONTENT: &str = "pasted-content";
pub const EMPTY_DIFF_SUMMARY: &str = "No valid diff detected.";

const QUERY_PER_FILE_CHARS: usize = 300;
const QUERY_TOTAL_CHARS: usize = 500;
const HUNK_PROMPT_CHARS: usize = 800;
const SNIPPET_PROMPT_CHARS: usize = 600;
const DEGRADED_SUMMARY_CHARS: usize = 500;
const REPORT_MAX_TOKENS: u32 = 2_000;

const ANALYSIS_SYSTEM: &str = "You are a senior reviewer assessing the impact of a code change. \
Respond with a single JSON object and nothing else.";

const ANALYSIS_INSTRUCTIONS: &str = r#"Analyze the diff below using the related code and project knowledge.
Return ONLY a JSON object with these keys:
{
  "summary": "two or three sentences",
  "whatChanged": ["..."],
  "impactedFiles": ["..."],
  "impactedModules": ["..."],
  "architecturalImpact": "...",
  "riskLevel": "low" | "medium" | "high",
  "testsToUpdate": ["..."],
  "possibleRegressions": ["..."]
}"#;

// ============ Report ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Anything other than a known level, including a missing value, is `Low`.
    pub fn coerce(value: Option<&Value>) -> Self {
        match value
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("medium") => RiskLevel::Medium,
            Some("high") => RiskLevel::High,
            _ => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub summary: String,
    pub what_changed: Vec<String>,
    pub impacted_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impacted_modules: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architectural_impact: Option<String>,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests_to_update: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_regressions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
    /// True when the report was built from unparseable model output.
    pub degraded: bool,
}

impl DiffReport {
    pub fn empty() -> Self {
        Self {
            summary: EMPTY_DIFF_SUMMARY.to_string(),
            what_changed: Vec::new(),
            impacted_files: Vec::new(),
            impacted_modules: None,
            architectural_impact: None,
            risk_level: RiskLevel::Low,
            tests_to_update: None,
            possible_regressions: None,
            usage: None,
            degraded: false,
        }
    }

    /// Validate every field of a parsed model object.
    fn from_model(obj: &Map<String, Value>, usage: UsageMetrics) -> Self {
        Self {
            summary: obj
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            what_changed: string_array(obj.get("whatChanged")).unwrap_or_default(),
            impacted_files: string_array(obj.get("impactedFiles")).unwrap_or_default(),
            impacted_modules: string_array(obj.get("impactedModules")),
            architectural_impact: obj
                .get("architecturalImpact")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            risk_level: RiskLevel::coerce(obj.get("riskLevel")),
            tests_to_update: string_array(obj.get("testsToUpdate")),
            possible_regressions: string_array(obj.get("possibleRegressions")),
            usage: Some(usage),
            degraded: false,
        }
    }

    fn degraded(raw: &str, files: &[DiffFile], usage: UsageMetrics) -> Self {
        Self {
            summary: truncate_chars(raw.trim(), DEGRADED_SUMMARY_CHARS).to_string(),
            impacted_files: files.iter().map(|f| f.path.clone()).collect(),
            risk_level: RiskLevel::Medium,
            usage: Some(usage),
            degraded: true,
            ..Self::empty()
        }
    }
}

/// String elements of an array value; `None` for anything but an array.
fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

// ============ Parsing ============

/// Markers only count at the start of a line, so prose mentioning `@@` or
/// a markdown `---` rule stays pasted content.
fn looks_like_diff(input: &str) -> bool {
    let starts = |prefix: &str| input.lines().any(|line| line.starts_with(prefix));
    starts("diff --git ") || starts("@@ -") || (starts("--- ") && starts("+++ "))
}

fn pasted(input: &str) -> Vec<DiffFile> {
    vec![DiffFile {
        path: PASTED_CONTENT.to_string(),
        hunks: vec![input.to_string()],
    }]
}

fn strip_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Path from a `---`/`+++` marker line, ignoring `/dev/null` and any
/// trailing timestamp.
fn marker_path(rest: &str) -> Option<String> {
    let path = rest.split('\t').next()?.trim();
    if path.is_empty() || path == "/dev/null" {
        None
    } else {
        Some(strip_prefix(path).to_string())
    }
}

struct DiffParser {
    files: Vec<DiffFile>,
    current: Option<DiffFile>,
    hunk: Option<Vec<String>>,
}

impl DiffParser {
    fn flush_hunk(&mut self) {
        if let (Some(lines), Some(file)) = (self.hunk.take(), self.current.as_mut()) {
            file.hunks.push(lines.join("\n"));
        }
    }

    fn flush_file(&mut self) {
        self.flush_hunk();
        if let Some(file) = self.current.take() {
            if !file.hunks.is_empty() {
                self.files.push(file);
            }
        }
    }

    fn start_file(&mut self, path: String) {
        self.flush_file();
        self.current = Some(DiffFile {
            path,
            hunks: Vec::new(),
        });
    }

    fn line(&mut self, line: &str) {
        if let Some(header) = line.strip_prefix("diff --git ") {
            let path = header
                .split_whitespace()
                .last()
                .map(strip_prefix)
                .unwrap_or(PASTED_CONTENT)
                .to_string();
            self.start_file(path);
        } else if line.starts_with("@@ -") {
            self.flush_hunk();
            if self.current.is_none() {
                self.current = Some(DiffFile {
                    path: PASTED_CONTENT.to_string(),
                    hunks: Vec::new(),
                });
            }
            self.hunk = Some(vec![line.to_string()]);
        } else if let Some(hunk) = self.hunk.as_mut() {
            hunk.push(line.to_string());
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if self.current.is_none() {
                let path = marker_path(rest).unwrap_or_else(|| PASTED_CONTENT.to_string());
                self.start_file(path);
            }
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            if let (Some(path), Some(file)) = (marker_path(rest), self.current.as_mut()) {
                file.path = path;
            }
        }
    }
}

/// Split a unified diff into files and hunks.
///
/// Blank input yields no files. Input without any diff markers becomes a
/// single [`PASTED_CONTENT`] file whose only hunk is the raw text. Files
/// without hunks are dropped.
pub fn parse_diff(input: &str) -> Vec<DiffFile> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    if !looks_like_diff(input) {
        return pasted(input);
    }

    let mut parser = DiffParser {
        files: Vec::new(),
        current: None,
        hunk: None,
    };
    for line in input.lines() {
        parser.line(line);
    }
    parser.flush_file();
    parser.files
}

/// Bounded text used to embed the retrieval query for a diff.
pub fn build_query_summary(files: &[DiffFile]) -> String {
    let summary = files
        .iter()
        .map(|file| {
            let body = file.hunks.join("\n");
            format!("{}\n{}", file.path, truncate_chars(&body, QUERY_PER_FILE_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    truncate_chars(&summary, QUERY_TOTAL_CHARS).to_string()
}

fn build_prompt(files: &[DiffFile], code: &[SearchHit], memories: &[MemoryItem]) -> String {
    let mut prompt = String::from(ANALYSIS_INSTRUCTIONS);

    prompt.push_str("\n\n## Diff\n");
    for file in files {
        prompt.push_str(&format!("\n### {}\n", file.path));
        for hunk in &file.hunks {
            prompt.push_str(&truncate_with_marker(hunk, HUNK_PROMPT_CHARS, "\n(truncated)"));
            prompt.push('\n');
        }
    }

    if !code.is_empty() {
        prompt.push_str("\n## Related code\n");
        for hit in code {
            prompt.push_str(&format!(
                "\n### {}\n{}\n",
                hit.path,
                truncate_chars(&hit.content, SNIPPET_PROMPT_CHARS)
            ));
        }
    }

    if !memories.is_empty() {
        prompt.push_str("\n## Project knowledge\n");
        for item in memories {
            prompt.push_str(&format!("- [{}] {}\n", item.kind.as_str(), item.content));
        }
    }

    prompt
}

// ============ Analyzer ============

pub struct DiffAnalyzer {
    chat: Arc<dyn ChatClient>,
    embedder: Arc<dyn Embedder>,
    retrieval: Arc<RetrievalEngine>,
    memory: Arc<MemoryService>,
    code_limit: usize,
    memory_limit: usize,
    llm_retry: RetryPolicy,
    embedding_retry: RetryPolicy,
}

impl DiffAnalyzer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatClient>,
        embedder: Arc<dyn Embedder>,
        retrieval: Arc<RetrievalEngine>,
        memory: Arc<MemoryService>,
        code_limit: usize,
        memory_limit: usize,
        llm_retry: RetryPolicy,
        embedding_retry: RetryPolicy,
    ) -> Self {
        Self {
            chat,
            embedder,
            retrieval,
            memory,
            code_limit,
            memory_limit,
            llm_retry,
            embedding_retry,
        }
    }

    pub async fn analyze(&self, owner_id: &str, raw_diff: &str) -> Result<DiffReport> {
        let files = parse_diff(raw_diff);
        if files.is_empty() {
            return Ok(DiffReport::empty());
        }
        info!(project = owner_id, files = files.len(), "analyzing diff");

        let query = build_query_summary(&files);
        let vector = match run_with_retry(&self.embedding_retry, "embedding", || self.embedder.embed(&query)).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!(project = owner_id, error = %err, "query embedding failed, continuing without context");
                Vec::new()
            }
        };

        let code = self.related_code(owner_id, &vector).await;
        let memories = self.memory.recall(owner_id, &vector, self.memory_limit).await;
        debug!(project = owner_id, code = code.len(), memories = memories.len(), "gathered context");

        let request = CompletionRequest::new(build_prompt(&files, &code, &memories))
            .with_system(ANALYSIS_SYSTEM)
            .with_max_tokens(REPORT_MAX_TOKENS);
        let completion = run_with_retry(&self.llm_retry, "llm", || self.chat.complete(&request)).await?;

        Ok(match parse_object(&completion.content) {
            ModelJson::Parsed(obj) => DiffReport::from_model(&obj, completion.usage),
            ModelJson::Malformed(raw) => {
                warn!(project = owner_id, "model returned malformed JSON, using degraded report");
                DiffReport::degraded(&raw, &files, completion.usage)
            }
        })
    }

    async fn related_code(&self, owner_id: &str, vector: &[f32]) -> Vec<SearchHit> {
        if vector.is_empty() {
            return Vec::new();
        }
        match self.retrieval.search_by_vector(owner_id, vector, self.code_limit).await {
            Ok(results) => results.hits,
            Err(err) => {
                debug!(project = owner_id, error = %err, "no related code");
                Vec::new()
            }
        }
    }
}
