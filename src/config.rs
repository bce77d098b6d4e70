use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: 30,
            cache: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            multiplier: 2.0,
            max_delay_ms: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_true")]
    pub generate_readme: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 1000,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            max_file_chars: 12_000,
            generate_readme: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            memory_limit: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_total_budget")]
    pub total_budget: usize,
    #[serde(default = "default_fixed_overhead")]
    pub fixed_overhead: usize,
    #[serde(default = "default_min_output")]
    pub min_output_tokens: usize,
    #[serde(default = "default_max_output")]
    pub max_output_tokens: usize,
    #[serde(default = "default_min_draft_chars")]
    pub min_draft_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            total_budget: 16_000,
            fixed_overhead: 1_000,
            min_output_tokens: 2_000,
            max_output_tokens: 8_000,
            min_draft_chars: 200,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_true() -> bool {
    true
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    8000
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    1000
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}
fn default_max_file_chars() -> usize {
    12_000
}
fn default_limit() -> usize {
    10
}
fn default_memory_limit() -> usize {
    5
}
fn default_total_budget() -> usize {
    16_000
}
fn default_fixed_overhead() -> usize {
    1_000
}
fn default_min_output() -> usize {
    2_000
}
fn default_max_output() -> usize {
    8_000
}
fn default_min_draft_chars() -> usize {
    200
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// All-defaults configuration around a database path. Providers are
    /// disabled.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    /// Retry policy for embedding calls; the per-attempt timeout comes
    /// from the embedding section.
    pub fn embedding_retry(&self) -> RetryPolicy {
        self.retry_with_timeout(self.embedding.timeout_secs)
    }

    pub fn llm_retry(&self) -> RetryPolicy {
        self.retry_with_timeout(self.llm.timeout_secs)
    }

    fn retry_with_timeout(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }

    if config.retry.multiplier < 1.0 {
        anyhow::bail!("retry.multiplier must be >= 1.0");
    }

    if config.retrieval.limit == 0 {
        anyhow::bail!("retrieval.limit must be >= 1");
    }

    if config.generation.min_output_tokens > config.generation.max_output_tokens {
        anyhow::bail!("generation.min_output_tokens must be <= generation.max_output_tokens");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let text = format!("[db]\npath = \"/tmp/lens.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse("").unwrap();
        assert_eq!(config.ingest.batch_size, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.retrieval.memory_limit, 5);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let err = parse("[ingest]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n").unwrap_err();
        assert!(err.to_string().contains("dims"));
    }

    #[test]
    fn test_unknown_llm_provider_rejected() {
        let err = parse("[llm]\nprovider = \"bard\"\nmodel = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_retry_policy_uses_llm_timeout() {
        let config = parse("[llm]\ntimeout_secs = 5\n").unwrap();
        let policy = config.llm_retry();
        assert_eq!(policy.timeout, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 3);
    }
}
