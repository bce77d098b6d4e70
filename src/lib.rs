//! # Repo Lens
//!
//! A resilient AI content pipeline over source repositories.
//!
//! Repo Lens ingests a repository into a semantic index, then uses that
//! index to answer searches, analyze diffs for risk, and generate long
//! structured documents through an LLM backend. Every stage is built to
//! keep going when an upstream model or store misbehaves: per-file failures
//! are counted rather than raised, search degrades to recency, malformed
//! model output degrades to raw-text reports, and generated documents go
//! through a bounded completeness repair loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │   Loader   │──▶│   Ingest    │──▶│ VectorStore  │
//! │  FS / Git  │   │ Sum + Embed │   │ SQLite / mem │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │
//!              ┌──────────────┬─────────────┤
//!              ▼              ▼             ▼
//!        ┌──────────┐  ┌────────────┐  ┌──────────┐
//!        │  Search  │  │ Diff + Mem │  │  Docgen  │
//!        └──────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lens init
//! lens ingest my-project --path ../my-project
//! lens search my-project "how are retries configured"
//! git diff | lens diff my-project
//! lens doc generate my-project --subject "My Project"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Core data types |
//! | [`retry`] | Retry with exponential backoff and per-call timeout |
//! | [`embedding`] | Embedding clients and vector helpers |
//! | [`llm`] | Chat/completion clients and lenient JSON extraction |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`loader`] | Filesystem and Git repository loaders |
//! | [`ingest`] | Batched, fault-isolated ingestion |
//! | [`search`] | Retrieval with recency fallback |
//! | [`diff`] | Diff parsing and risk analysis |
//! | [`memory`] | Durable facts from Q&A exchanges |
//! | [`docgen`] | Templated documents with a repair loop |
//! | [`service`] | Dependency wiring and top-level operations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod diff;
pub mod docgen;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod retry;
pub mod search;
pub mod service;
pub mod store;
pub mod text;
