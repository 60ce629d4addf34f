//! TOML configuration.
//!
//! Only `[db]` is mandatory; every other section falls back to defaults
//! suitable for local runs (filesystem blob store, completion and
//! notifications disabled, generation off).
//!
//! ```toml
//! locale = "en"
//!
//! [db]
//! path = "./data/studydeck.sqlite"
//!
//! [segmentation]
//! min_chars = 200
//! max_chars = 4000
//!
//! [retry]
//! max_attempts = 3
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! multiplier = 2.0
//! retryable_signatures = ["overloaded"]
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [storage]
//! provider = "filesystem"
//! root = "./data/blobs"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Locale;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub segmentation: SegmentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Size and heading rules for the section segmenter.
#[derive(Debug, Deserialize, Clone)]
pub struct SegmentConfig {
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Lines longer than this are never treated as headings.
    #[serde(default = "default_max_heading_chars")]
    pub max_heading_chars: usize,
    /// Persisted headings are truncated to this many characters.
    #[serde(default = "default_heading_column_chars")]
    pub heading_column_chars: usize,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            max_heading_chars: default_max_heading_chars(),
            heading_column_chars: default_heading_column_chars(),
            keywords: default_keywords(),
        }
    }
}

impl SegmentConfig {
    /// Config with custom bounds and default heading rules.
    pub fn with_bounds(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
            ..Self::default()
        }
    }
}

fn default_min_chars() -> usize {
    200
}
fn default_max_chars() -> usize {
    4000
}
fn default_max_heading_chars() -> usize {
    120
}
fn default_heading_column_chars() -> usize {
    200
}
fn default_keywords() -> Vec<String> {
    [
        "chapter", "section", "part", "module", "lesson", "course", "capítulo", "sección",
        "parte", "módulo", "lección", "curso", "unidad", "tema",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Backoff parameters shared by every retried call site.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Extra substrings that mark an error retryable regardless of its kind.
    #[serde(default)]
    pub retryable_signatures: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            retryable_signatures: Vec::new(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            base_url: default_base_url(),
            model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_provider")]
    pub provider: String,
    /// Root directory for the filesystem provider (`<root>/<bucket>/<path>`).
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_region")]
    pub region: String,
    /// S3-compatible endpoint (MinIO, hosted storage gateways). Path-style.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            root: None,
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_storage_provider() -> String {
    "filesystem".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Base URL of the web app, used to build the deck link in emails.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: default_notify_provider(),
            url: None,
            app_url: default_app_url(),
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_notify_provider() -> String {
    "disabled".to_string()
}
fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_notify_timeout_secs() -> u64 {
    10
}

/// Per-section flashcard generation. Off unless explicitly enabled.
#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cards_per_section")]
    pub cards_per_section: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cards_per_section: default_cards_per_section(),
        }
    }
}

fn default_cards_per_section() -> usize {
    8
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate segmentation
    let seg = &config.segmentation;
    if seg.min_chars == 0 {
        anyhow::bail!("segmentation.min_chars must be > 0");
    }
    if seg.max_chars < seg.min_chars * 2 {
        anyhow::bail!("segmentation.max_chars must be at least twice segmentation.min_chars");
    }
    if seg.max_heading_chars == 0 || seg.heading_column_chars == 0 {
        anyhow::bail!("segmentation heading limits must be > 0");
    }

    // Validate retry
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if retry.multiplier < 1.0 {
        anyhow::bail!("retry.multiplier must be >= 1.0");
    }
    if retry.initial_delay_ms > retry.max_delay_ms {
        anyhow::bail!("retry.initial_delay_ms must not exceed retry.max_delay_ms");
    }

    // Validate completion
    match config.completion.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.completion.model.is_none() {
                anyhow::bail!("completion.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate storage
    match config.storage.provider.as_str() {
        "filesystem" | "s3" => {}
        other => anyhow::bail!(
            "Unknown storage provider: '{}'. Must be filesystem or s3.",
            other
        ),
    }

    // Validate notify
    match config.notify.provider.as_str() {
        "disabled" => {}
        "webhook" => {
            if config.notify.url.is_none() {
                anyhow::bail!("notify.url must be specified when provider is 'webhook'");
            }
        }
        other => anyhow::bail!(
            "Unknown notify provider: '{}'. Must be disabled or webhook.",
            other
        ),
    }

    if config.generation.enabled && !config.completion.is_enabled() {
        anyhow::bail!("generation.enabled requires a completion provider");
    }

    Ok(())
}
