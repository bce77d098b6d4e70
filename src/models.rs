//! Core data models used throughout repo-lens.
//!
//! These types represent the files, indexed units, memory facts, diff
//! structures, and generation outputs that flow through the pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A file produced by a repository loader before ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// One embedded file. Immutable once written.
#[derive(Debug, Clone)]
pub struct IndexedUnit {
    pub id: String,
    pub owner_id: String,
    pub path: String,
    pub raw_content: String,
    pub summary_text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Concept,
    Decision,
    Relationship,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Concept => "concept",
            MemoryKind::Decision => "decision",
            MemoryKind::Relationship => "relationship",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "concept" => Some(MemoryKind::Concept),
            "decision" => Some(MemoryKind::Decision),
            "relationship" => Some(MemoryKind::Relationship),
            _ => None,
        }
    }
}

/// A durable fact extracted from a question/answer exchange.
#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub id: String,
    pub owner_id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub embedding: Vec<f32>,
    pub relevance_score: f64,
    pub created_at: DateTime<Utc>,
}

/// A fact proposed by the extractor, not yet embedded or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFact {
    pub kind: MemoryKind,
    pub content: String,
}

/// One file of a parsed unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffFile {
    pub path: String,
    pub hunks: Vec<String>,
}

/// Token accounting attached to generation results. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub model_id: String,
}

/// Output of the structured document generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDraft {
    pub content: String,
    pub section_numbers_present: BTreeSet<u32>,
    pub expected_section_count: u32,
}

impl DocumentDraft {
    /// Complete iff the present sections are exactly `1..=expected`.
    pub fn is_complete(&self) -> bool {
        self.section_numbers_present.len() == self.expected_section_count as usize
            && self
                .section_numbers_present
                .iter()
                .copied()
                .eq(1..=self.expected_section_count)
    }
}

/// A retrieval hit. `similarity` is 0 for degraded recency results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub content: String,
    pub summary: String,
    pub similarity: f32,
}

/// A persisted generated document.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub owner_id: String,
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
