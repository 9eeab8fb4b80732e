use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::taxonomy::{CategoryDefinition, OTHER, SATISFIED, Taxonomy, default_categories};

/// Application configuration module
/// This module handles loading, environment overrides and validation of the
/// settings that drive one pipeline run. Everything that used to be ambient
/// (API keys, taxonomy, rate-limit constants) lives here and is passed to the
/// pipeline explicitly.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language-model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Pacing and retry settings for model calls
    #[serde(default)]
    pub requests: RequestConfig,

    /// Warehouse settings
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Output and cache locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Category taxonomy
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryDefinition>,

    /// How the app is named in the classification prompt
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Emit a progress line every this many reviews
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Draw a progress bar on stderr
    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Language-model API configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    // @field: Model name
    #[serde(default = "default_model")]
    pub model: String,

    // @field: API key, usually supplied through OPENAI_API_KEY
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Sampling temperature, provider default when unset
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
            timeout_secs: default_timeout_secs(),
            temperature: None,
        }
    }
}

/// Pacing and retry settings shared by translation and classification calls
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestConfig {
    /// Delay in milliseconds between consecutive model calls
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Attempts per call, including the first one
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base in milliseconds, doubled on each further retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Add up to 25% random jitter to backoff delays
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            jitter: false,
        }
    }
}

/// BigQuery warehouse configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WarehouseConfig {
    /// Project the query runs in and the table lives in
    #[serde(default = "default_project")]
    pub project: String,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_table")]
    pub table: String,

    /// REST endpoint
    #[serde(default = "default_bigquery_endpoint")]
    pub endpoint: String,

    /// App packages to fetch reviews for
    #[serde(default = "default_package_names")]
    pub package_names: Vec<String>,

    /// OAuth access token; BIGQUERY_ACCESS_TOKEN or gcloud when empty
    #[serde(default = "String::new")]
    pub access_token: String,

    /// Request timeout in seconds
    #[serde(default = "default_warehouse_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            dataset: default_dataset(),
            table: default_table(),
            endpoint: default_bigquery_endpoint(),
            package_names: default_package_names(),
            access_token: String::new(),
            timeout_secs: default_warehouse_timeout_secs(),
        }
    }
}

/// Output and cache directories
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    /// Cache root; one sub-directory per date range
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where detail files are written
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_rate_limit_delay_ms() -> u64 {
    500
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_project() -> String {
    "mozdata".to_string()
}

fn default_dataset() -> String {
    "google_play_store".to_string()
}

fn default_table() -> String {
    "reviews".to_string()
}

fn default_bigquery_endpoint() -> String {
    "https://bigquery.googleapis.com/bigquery/v2".to_string()
}

fn default_package_names() -> Vec<String> {
    vec![
        "org.mozilla.firefox".to_string(),
        "org.mozilla.firefox_beta".to_string(),
        "org.mozilla.fenix".to_string(),
    ]
}

fn default_warehouse_timeout_secs() -> u64 {
    120
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_app_name() -> String {
    "the Firefox browser".to_string()
}

fn default_progress_interval() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration file, or defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let file = File::open(path).with_context(|| format!("Failed to open config file: {:?}", path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.model.api_key = key.trim().to_string();
        }
        if let Some(token) = lookup("BIGQUERY_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.warehouse.access_token = token.trim().to_string();
        }
    }

    /// Validate the configuration for consistency and required values.
    ///
    /// The API key is not required here: a run whose classifications are all
    /// cached never calls the model.
    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(anyhow!("At least one category must be configured"));
        }

        let taxonomy = self.taxonomy();
        for required in [SATISFIED, OTHER] {
            if !taxonomy.contains(required) {
                return Err(anyhow!("Category taxonomy must contain '{}'", required));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(anyhow!("Category names must not be empty"));
            }
            if !seen.insert(category.name.to_lowercase()) {
                return Err(anyhow!("Duplicate category: {}", category.name));
            }
        }

        if self.requests.retry_count == 0 {
            return Err(anyhow!("requests.retry_count must be at least 1"));
        }
        if self.progress_interval == 0 {
            return Err(anyhow!("progress_interval must be at least 1"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must not be empty"));
        }
        if self.warehouse.package_names.is_empty() {
            return Err(anyhow!("warehouse.package_names must list at least one package"));
        }

        Ok(())
    }

    /// Taxonomy built from the configured categories
    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::new(self.categories.clone())
    }

    pub fn has_api_key(&self) -> bool {
        !self.model.api_key.trim().is_empty()
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            model: ModelConfig::default(),
            requests: RequestConfig::default(),
            warehouse: WarehouseConfig::default(),
            paths: PathsConfig::default(),
            categories: default_categories(),
            app_name: default_app_name(),
            progress_interval: default_progress_interval(),
            show_progress: true,
            log_level: LogLevel::default(),
        }
    }
}
