use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub repos: ReposConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./analysis_cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_lines() -> usize {
    1000
}
fn default_max_chars() -> usize {
    6000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyzerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_response_format")]
    pub response_format: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub request_delay_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            response_format: default_response_format(),
            temperature: 0.0,
            max_attempts: default_max_attempts(),
            request_delay_ms: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AnalyzerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_response_format() -> String {
    "json_schema".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    1000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WalkConfig {
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReposConfig {
    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,
    #[serde(default = "default_shallow")]
    pub shallow: bool,
    #[serde(default)]
    pub branch: Option<String>,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            clone_dir: default_clone_dir(),
            shallow: default_shallow(),
            branch: None,
        }
    }
}

fn default_clone_dir() -> PathBuf {
    PathBuf::from("./cloned_repos")
}
fn default_shallow() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_lines == 0 {
        anyhow::bail!("chunking.max_lines must be > 0");
    }
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    let analyzer = &config.analyzer;
    if analyzer.max_attempts == 0 {
        anyhow::bail!("analyzer.max_attempts must be >= 1");
    }
    if analyzer.max_concurrency == 0 {
        anyhow::bail!("analyzer.max_concurrency must be >= 1");
    }

    match analyzer.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown analyzer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match analyzer.response_format.as_str() {
        "json_schema" | "json_object" => {}
        other => anyhow::bail!(
            "Unknown analyzer.response_format: '{}'. Must be json_schema or json_object.",
            other
        ),
    }

    if analyzer.is_enabled() && analyzer.model.trim().is_empty() {
        anyhow::bail!(
            "analyzer.model must be specified when provider is '{}'",
            analyzer.provider
        );
    }

    Ok(())
}
