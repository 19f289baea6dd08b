//! Configuration management for citewise.
//!
//! Configuration is layered, lowest precedence first:
//! - Built-in defaults
//! - The workspace config file (`.citewise/config.yaml`)
//! - `CITEWISE_*` environment variables
//! - Command-line flags
//!
//! The configuration is read once when a pipeline is constructed and is
//! immutable afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".citewise";

/// Generator providers the LLM factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 2] = ["ollama", "extractive"];

/// Largest accepted `retrieval.topK`.
pub const MAX_TOP_K: usize = 100;

/// Largest accepted `retrieval.rerank.poolSize`.
pub const MAX_RERANK_POOL: usize = 500;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .citewise/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generator provider ("ollama" or "extractive")
    pub provider: String,

    /// Generator model identifier
    pub model: String,

    /// Generator endpoint; providers fall back to their own default
    pub endpoint: Option<String>,

    /// Sampling temperature for answer generation
    pub temperature: f32,

    /// Corpus (index) the pipeline answers from
    pub corpus: String,

    pub retrieval: RetrievalConfig,

    pub moderation: ModerationConfig,

    /// Deadline applied to every collaborator call, in seconds
    pub stage_timeout_secs: u64,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Retriever tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Number of passages handed to the generator (K)
    pub top_k: usize,

    /// Minimum similarity a candidate needs; 0 disables the threshold
    pub min_similarity: f32,

    /// Prefer at most one passage per page
    pub unique_pages: bool,

    pub rerank: RerankConfig,
}

/// Cross-encoder rerank settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RerankConfig {
    pub enabled: bool,

    /// "lexical" (offline) or "http" (cross-encoder server)
    pub provider: String,

    pub model: String,

    pub endpoint: Option<String>,

    /// Number of top vector candidates to rescore; defaults to max(3K, 12)
    pub pool_size: Option<usize>,

    /// Weight of the cross-encoder score in the blend
    pub alpha: f32,
}

/// Input moderation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModerationConfig {
    pub enabled: bool,

    /// "keyword" (offline) or "llm" (classifier prompt)
    pub provider: String,

    /// Human description of what the corpus covers, used in the classifier prompt
    pub topic: String,

    /// Terms that mark a query as on-topic for the keyword moderator.
    /// Empty disables the topicality check.
    pub topic_keywords: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_similarity: 0.05,
            unique_pages: true,
            rerank: RerankConfig::default(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "lexical".to_string(),
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            endpoint: None,
            pool_size: None,
            alpha: 0.7,
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "keyword".to_string(),
            topic: "the indexed document corpus".to_string(),
            topic_keywords: Vec::new(),
        }
    }
}

impl RetrievalConfig {
    /// Number of candidates requested from the vector index.
    pub fn overfetch(&self) -> usize {
        self.top_k.saturating_mul(3)
    }

    /// Number of top vector candidates rescored by the cross-encoder.
    pub fn rerank_pool_size(&self) -> usize {
        self.rerank
            .pool_size
            .unwrap_or_else(|| self.top_k.saturating_mul(3).max(12))
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    llm: Option<LlmSection>,
    corpus: Option<String>,
    retrieval: Option<RetrievalConfig>,
    moderation: Option<ModerationConfig>,
    stage_timeout_secs: Option<u64>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2:3b-instruct-q4_K_M".to_string(),
            endpoint: None,
            temperature: 0.0,
            corpus: "default".to_string(),
            retrieval: RetrievalConfig::default(),
            moderation: ModerationConfig::default(),
            stage_timeout_secs: 30,
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `CITEWISE_WORKSPACE`, `CITEWISE_CONFIG`
    /// - `CITEWISE_PROVIDER`, `CITEWISE_MODEL`, `CITEWISE_ENDPOINT`, `CITEWISE_CORPUS`
    /// - `CITEWISE_TOP_K`, `CITEWISE_MIN_SIM`, `CITEWISE_UNIQUE_PAGES`
    /// - `CITEWISE_RERANK_ENABLE`, `CITEWISE_RERANK_TOP_K`, `CITEWISE_RERANK_ALPHA`
    /// - `CITEWISE_STAGE_TIMEOUT_SECS`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use citewise_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], but with the workspace and config file
    /// already chosen by the caller (usually from CLI flags).
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| std::env::var_os("CITEWISE_WORKSPACE").map(PathBuf::from)) {
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var_os("CITEWISE_CONFIG").map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
            if let Some(temperature) = llm.temperature {
                result.temperature = temperature;
            }
        }

        if let Some(corpus) = config_file.corpus {
            result.corpus = corpus;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(moderation) = config_file.moderation {
            result.moderation = moderation;
        }
        if let Some(secs) = config_file.stage_timeout_secs {
            result.stage_timeout_secs = secs;
        }

        Ok(result)
    }

    /// Apply environment overrides read through `lookup`.
    fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("CITEWISE_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = lookup("CITEWISE_MODEL") {
            self.model = model;
        }
        if let Some(endpoint) = lookup("CITEWISE_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(corpus) = lookup("CITEWISE_CORPUS") {
            self.corpus = corpus;
        }
        if let Some(v) = lookup("CITEWISE_TOP_K") {
            self.retrieval.top_k = parse_env("CITEWISE_TOP_K", &v)?;
        }
        if let Some(v) = lookup("CITEWISE_MIN_SIM") {
            self.retrieval.min_similarity = parse_env("CITEWISE_MIN_SIM", &v)?;
        }
        if let Some(v) = lookup("CITEWISE_UNIQUE_PAGES") {
            self.retrieval.unique_pages = parse_flag("CITEWISE_UNIQUE_PAGES", &v)?;
        }
        if let Some(v) = lookup("CITEWISE_RERANK_ENABLE") {
            self.retrieval.rerank.enabled = parse_flag("CITEWISE_RERANK_ENABLE", &v)?;
        }
        if let Some(v) = lookup("CITEWISE_RERANK_TOP_K") {
            self.retrieval.rerank.pool_size = Some(parse_env("CITEWISE_RERANK_TOP_K", &v)?);
        }
        if let Some(v) = lookup("CITEWISE_RERANK_ALPHA") {
            self.retrieval.rerank.alpha = parse_env("CITEWISE_RERANK_ALPHA", &v)?;
        }
        if let Some(v) = lookup("CITEWISE_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs = parse_env("CITEWISE_STAGE_TIMEOUT_SECS", &v)?;
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.log_level = Some(level);
        }
        if lookup("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        corpus: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(corpus) = corpus {
            self.corpus = corpus;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .citewise directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .citewise directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Deadline applied to each collaborator call.
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Validate the configuration before a pipeline is built from it.
    pub fn validate(&self) -> AppResult<()> {
        if !KNOWN_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be at least 1".to_string()));
        }

        if self.retrieval.top_k > MAX_TOP_K {
            return Err(AppError::Config(format!(
                "retrieval.topK must be at most {}, got {}",
                MAX_TOP_K, self.retrieval.top_k
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(AppError::Config(format!(
                "retrieval.minSimilarity must be within [0, 1], got {}",
                self.retrieval.min_similarity
            )));
        }

        if !(0.0..=1.0).contains(&self.retrieval.rerank.alpha) {
            return Err(AppError::Config(format!(
                "retrieval.rerank.alpha must be within [0, 1], got {}",
                self.retrieval.rerank.alpha
            )));
        }

        match self.retrieval.rerank.pool_size {
            Some(0) => {
                return Err(AppError::Config(
                    "retrieval.rerank.poolSize must be at least 1".to_string(),
                ));
            }
            Some(size) if size > MAX_RERANK_POOL => {
                return Err(AppError::Config(format!(
                    "retrieval.rerank.poolSize must be at most {}, got {}",
                    MAX_RERANK_POOL, size
                )));
            }
            _ => {}
        }

        if self.stage_timeout_secs == 0 {
            return Err(AppError::Config("stageTimeoutSecs must be positive".to_string()));
        }

        if self.corpus.trim().is_empty() {
            return Err(AppError::Config("corpus name must not be empty".to_string()));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid value for {}: {:?}", key, value)))
}

fn parse_flag(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("Invalid value for {}: {:?}", key, value))),
    }
}
