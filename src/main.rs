//! # Repo Lens CLI (`lens`)
//!
//! ## Usage
//!
//! ```bash
//! lens --config ./config/lens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lens init` | Create the SQLite database and run schema migrations |
//! | `lens ingest <project> --path DIR` | Index a local checkout |
//! | `lens ingest <project> --git URL` | Index a remote repository |
//! | `lens search <project> "<query>"` | Semantic search over the index |
//! | `lens diff <project>` | Risk report for a diff (stdin or `--file`) |
//! | `lens doc generate <project>` | Generate and store a templated document |
//! | `lens doc modify <project>` | Edit the latest stored document |
//! | `lens remember <project>` | Store durable facts from a Q&A exchange |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries only
//! command output.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_lens::config::{self, Config};
use repo_lens::loader::{FsLoader, GitLoader, RepositoryLoader};
use repo_lens::migrate;
use repo_lens::service::Lens;

/// Repo Lens: index a repository, then search it, review diffs against it,
/// and generate documentation from it.
#[derive(Parser)]
#[command(name = "lens", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Replace a project's index with the contents of a repository.
    Ingest {
        /// Project identifier that owns the indexed content.
        project: String,

        /// Local directory to index.
        #[arg(long, conflicts_with = "git", required_unless_present = "git")]
        path: Option<PathBuf>,

        /// Remote repository URL to clone and index.
        #[arg(long)]
        git: Option<String>,

        /// Branch to check out with `--git`.
        #[arg(long, default_value = "main")]
        branch: String,

        /// Where remote clones are cached. Defaults to `repos/` next to the database.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Search a project's index.
    Search {
        project: String,
        query: String,

        /// Maximum number of results (defaults to `[retrieval] limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Analyze a unified diff and print a JSON risk report.
    Diff {
        project: String,

        /// Read the diff from a file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Generate or modify structured documents.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Extract durable facts from a question/answer exchange and store them.
    Remember {
        project: String,

        #[arg(long)]
        question: String,

        #[arg(long)]
        answer: String,
    },
}

#[derive(Subcommand)]
enum DocAction {
    /// Generate a complete document from the project's index.
    Generate {
        project: String,

        /// Name used in the document's title and prose.
        #[arg(long)]
        subject: String,

        /// Template name (`readme` or `technical`).
        #[arg(long, default_value = "readme")]
        template: String,
    },

    /// Apply an edit to the latest stored document of a template.
    Modify {
        project: String,

        #[arg(long)]
        instruction: String,

        #[arg(long, default_value = "readme")]
        template: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest {
            project,
            path,
            git,
            branch,
            cache_dir,
        } => {
            let loader = build_loader(&cfg, path, git, &branch, cache_dir)?;
            let lens = Lens::open(&cfg).await?;
            let report = lens.ingest_repository(&project, loader.as_ref()).await?;

            println!("ingest {}", project);
            println!("  files processed: {}", report.files_processed);
            println!("  succeeded: {}", report.success_count);
            println!("  failed: {}", report.fail_count);
            println!(
                "  readme generated: {}",
                if report.readme_generated { "yes" } else { "no" }
            );
            for err in &report.errors {
                println!("  ! {}: {}", err.subject, err.message);
            }
        }
        Commands::Search { project, query, limit } => {
            let lens = Lens::open(&cfg).await?;
            let results = lens.search(&project, &query, limit).await?;

            if results.degraded {
                println!("(vector search unavailable; showing most recent files)");
            }
            for (i, hit) in results.hits.iter().enumerate() {
                println!("{}. [{:.3}] {}", i + 1, hit.similarity, hit.path);
                if let Some(line) = hit.summary.lines().find(|l| !l.trim().is_empty()) {
                    println!("    {}", line.trim());
                }
            }
        }
        Commands::Diff { project, file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading diff from {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("reading diff from stdin")?;
                    buf
                }
            };

            let lens = Lens::open(&cfg).await?;
            let report = lens.analyze_diff(&project, &raw).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Doc { action } => {
            let lens = Lens::open(&cfg).await?;
            let generated = match action {
                DocAction::Generate {
                    project,
                    subject,
                    template,
                } => lens.generate_document(&project, &template, &subject).await?,
                DocAction::Modify {
                    project,
                    instruction,
                    template,
                } => lens.modify_document(&project, &template, &instruction).await?,
            };
            println!("{}", generated.draft.content);
        }
        Commands::Remember {
            project,
            question,
            answer,
        } => {
            let lens = Lens::open(&cfg).await?;
            let outcomes = lens.remember(&project, &question, &answer).await;
            let stored = outcomes.iter().filter(|o| o.is_ok()).count();
            println!("stored {} of {} facts", stored, outcomes.len());
        }
    }

    Ok(())
}

fn build_loader(
    cfg: &Config,
    path: Option<PathBuf>,
    git: Option<String>,
    branch: &str,
    cache_dir: Option<PathBuf>,
) -> Result<Box<dyn RepositoryLoader>> {
    match (path, git) {
        (Some(path), None) => Ok(Box::new(FsLoader::new(path, &cfg.ingest))),
        (None, Some(url)) => {
            let cache_root = cache_dir.unwrap_or_else(|| {
                cfg.db
                    .path
                    .parent()
                    .map(|p| p.join("repos"))
                    .unwrap_or_else(|| PathBuf::from("repos"))
            });
            Ok(Box::new(GitLoader::new(&url, branch, &cache_root, &cfg.ingest)))
        }
        _ => bail!("pass exactly one of --path or --git"),
    }
}
