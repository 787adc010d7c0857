use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::text::TextFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub assets: AssetConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Active directory that ingested images are written to.
    #[serde(default = "default_assets_path")]
    pub path: PathBuf,

    /// Where archived images are relocated. Defaults to `<path>/archive`.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Maximum number of images kept in the active directory.
    #[serde(default = "default_archive_threshold")]
    pub archive_threshold: usize,

    #[serde(default = "default_image_extensions")]
    pub extensions: Vec<String>,
}

impl AssetConfig {
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.path.join("archive"))
    }
}

fn default_assets_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("picseek/images")
}

fn default_archive_threshold() -> usize {
    300
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            path: default_assets_path(),
            archive_dir: None,
            archive_threshold: default_archive_threshold(),
            extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Base URL of the OCR service.
    #[serde(default = "default_ocr_endpoint")]
    pub endpoint: String,

    /// Lines recognized with a score at or below this are dropped.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Images recognized per batch. Bounds peak memory of the engine.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Empty results tolerated before a record is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Daily run time for the scheduled drain (HH:MM, 24h, local time).
    #[serde(default = "default_scheduled_time")]
    pub scheduled_time: String,

    /// Noise filters applied to every recognized line, in order.
    #[serde(default = "default_filters")]
    pub filters: Vec<TextFilter>,

    /// Upper bound on batches in one drain run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_ocr_endpoint() -> String {
    "http://127.0.0.1:8866".to_string()
}

fn default_min_confidence() -> f32 {
    0.6
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_scheduled_time() -> String {
    "04:00".to_string()
}

fn default_filters() -> Vec<TextFilter> {
    vec![TextFilter::Blank, TextFilter::DigitsOnly, TextFilter::SymbolsOnly]
}

fn default_max_iterations() -> usize {
    100
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ocr_endpoint(),
            min_confidence: default_min_confidence(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            scheduled_time: default_scheduled_time(),
            filters: default_filters(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Hamming distance threshold for perceptual hash similarity (64-bit hash).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: u32,

    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_limit() -> usize {
    3
}

fn default_max_limit() -> usize {
    50
}

fn default_similarity_threshold() -> u32 {
    5
}

fn default_excerpt_chars() -> usize {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            similarity_threshold: default_similarity_threshold(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between archive checks run by the daemon.
    #[serde(default = "default_archive_interval_minutes")]
    pub archive_interval_minutes: u64,

    /// Daemon tick interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_archive_interval_minutes() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            archive_interval_minutes: default_archive_interval_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("picseek")
        .join("picseek.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            assets: AssetConfig::default(),
            recognition: RecognitionConfig::default(),
            search: SearchConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load from `PICSEEK_CONFIG` or the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values the pipeline and queries cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.recognition.max_retries == 0 {
            bail!("recognition.max_retries must be at least 1");
        }
        if self.recognition.batch_size == 0 {
            bail!("recognition.batch_size must be at least 1");
        }
        if self.recognition.max_iterations == 0 {
            bail!("recognition.max_iterations must be at least 1");
        }
        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            bail!("search.default_limit must be between 1 and search.max_limit");
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("picseek")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PICSEEK_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}
