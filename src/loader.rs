//! Repository loaders: produce `(path, content)` pairs for ingestion.
//!
//! - [`FsLoader`] walks a local checkout, applying include/exclude globs.
//! - [`GitLoader`] clones (or fetches) a remote repository into a cache
//!   directory, then walks it with an [`FsLoader`].
//!
//! Load failures are retryable except credential rejections, which surface
//! as [`Error::Unauthorized`].

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::models::SourceFile;
use crate::text::truncate_chars;

const SERVICE: &str = "repository-loader";

#[async_trait]
pub trait RepositoryLoader: Send + Sync {
    /// Human-readable reference for logs (a path or a URL).
    fn describe(&self) -> String;
    async fn load(&self) -> Result<Vec<SourceFile>>;
}

// ============ Filesystem ============

pub struct FsLoader {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
    max_file_chars: usize,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>, config: &IngestConfig) -> Self {
        Self {
            root: root.into(),
            include: config.include_globs.clone(),
            exclude: config.exclude_globs.clone(),
            max_file_chars: config.max_file_chars,
        }
    }

    fn walk(&self) -> Result<Vec<SourceFile>> {
        if !self.root.exists() {
            return Err(Error::Validation(format!(
                "repository root does not exist: {}",
                self.root.display()
            )));
        }

        let include_set = build_globset(&self.include)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.exclude.iter().cloned());
        let exclude_set = build_globset(&default_excludes)?;

        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| Error::external(SERVICE, e.to_string(), false))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            match read_text(path) {
                Some(content) if !content.trim().is_empty() => {
                    let content = truncate_chars(&content, self.max_file_chars).to_string();
                    files.push(SourceFile::new(rel_str, content));
                }
                _ => debug!(path = %rel_str, "skipping empty or non-text file"),
            }
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[async_trait]
impl RepositoryLoader for FsLoader {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn load(&self) -> Result<Vec<SourceFile>> {
        self.walk()
    }
}

fn read_text(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    if content.contains('\0') {
        None
    } else {
        Some(content)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Validation(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Validation(format!("invalid glob set: {}", e)))
}

// ============ Git ============

pub struct GitLoader {
    url: String,
    branch: String,
    cache_dir: PathBuf,
    files: FsLoader,
}

impl GitLoader {
    /// `cache_root` holds one clone per URL, keyed by a short hash.
    pub fn new(url: &str, branch: &str, cache_root: &Path, config: &IngestConfig) -> Self {
        let cache_dir = cache_root.join(short_hash(url));
        Self {
            url: url.to_string(),
            branch: branch.to_string(),
            files: FsLoader::new(cache_dir.clone(), config),
            cache_dir,
        }
    }

    async fn clone_repo(&self) -> Result<()> {
        // Leftovers from an interrupted clone make `git clone` refuse the target.
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)
                .map_err(|e| Error::external(SERVICE, format!("cannot reset cache dir: {}", e), false))?;
        }
        if let Some(parent) = self.cache_dir.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::external(SERVICE, format!("cannot create cache dir: {}", e), false))?;
        }

        run_git(
            Command::new("git")
                .args(["clone", "--depth", "1", "--branch", &self.branch, "--single-branch"])
                .arg(&self.url)
                .arg(&self.cache_dir),
            "clone",
        )
        .await
    }

    async fn pull(&self) -> Result<()> {
        run_git(
            Command::new("git")
                .args(["fetch", "--depth", "1", "origin", &self.branch])
                .current_dir(&self.cache_dir),
            "fetch",
        )
        .await?;

        let remote_ref = format!("origin/{}", self.branch);
        run_git(
            Command::new("git")
                .args(["reset", "--hard", &remote_ref])
                .current_dir(&self.cache_dir),
            "reset",
        )
        .await
    }
}

#[async_trait]
impl RepositoryLoader for GitLoader {
    fn describe(&self) -> String {
        format!("{}@{}", self.url, self.branch)
    }

    async fn load(&self) -> Result<Vec<SourceFile>> {
        if self.cache_dir.join(".git").exists() {
            self.pull().await?;
        } else {
            info!(url = %self.url, branch = %self.branch, "cloning repository");
            self.clone_repo().await?;
        }
        self.files.walk()
    }
}

async fn run_git(cmd: &mut Command, step: &str) -> Result<()> {
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::external(SERVICE, format!("failed to execute 'git {}': {}", step, e), false))?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(classify_git_failure(step, stderr))
}

fn classify_git_failure(step: &str, stderr: String) -> Error {
    let lowered = stderr.to_ascii_lowercase();
    let auth_markers = [
        "authentication failed",
        "could not read username",
        "permission denied (publickey)",
        "access denied",
        "403",
    ];

    let message = format!("git {} failed: {}", step, stderr);
    if auth_markers.iter().any(|m| lowered.contains(m)) {
        Error::Unauthorized {
            service: SERVICE,
            message,
        }
    } else {
        Error::external(SERVICE, message, true)
    }
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ingest_config() -> IngestConfig {
        IngestConfig {
            include_globs: vec!["**/*.rs".to_string(), "**/*.md".to_string()],
            max_file_chars: 16,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fs_loader_filters_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(root.join("README.md"), "# Readme").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored").unwrap();
        std::fs::write(root.join("target/debug/gen.rs"), "// build output").unwrap();
        std::fs::write(root.join("src/empty.rs"), "   ").unwrap();

        let files = FsLoader::new(root, &ingest_config()).load().await.unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
    }

    #[tokio::test]
    async fn test_fs_loader_truncates_content() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("long.md"), "a".repeat(100)).unwrap();

        let files = FsLoader::new(tmp.path(), &ingest_config()).load().await.unwrap();
        assert_eq!(files[0].content.len(), 16);
    }

    #[tokio::test]
    async fn test_missing_root_is_validation_error() {
        let err = FsLoader::new("/definitely/not/here", &ingest_config())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_git_auth_failure_not_retryable() {
        let err = classify_git_failure(
            "clone",
            "fatal: Authentication failed for 'https://example.com/repo.git/'".to_string(),
        );
        assert!(matches!(err, Error::Unauthorized { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_git_network_failure_retryable() {
        let err = classify_git_failure("fetch", "fatal: unable to access: Could not resolve host".to_string());
        assert!(err.is_retryable());
    }
}
