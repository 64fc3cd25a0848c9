use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ai::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::classify::{DEFAULT_AI_LIMIT, DEFAULT_CHUNK_SIZE};
use crate::error::{AppError, Result};
use crate::keywords::KeywordFile;
use crate::models::PENDING_TTL_DAYS;

/// One RSS/Atom source to crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    pub source_name: String,
    pub url: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_ai_api_url")]
    pub ai_api_url: String,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    #[serde(default = "default_ai_call_delay_ms")]
    pub ai_call_delay_ms: u64,

    #[serde(default = "default_ai_limit")]
    pub ai_default_limit: usize,

    #[serde(default = "default_keyword_file")]
    pub keyword_file: PathBuf,

    #[serde(default)]
    pub keyword_fallback_paths: Vec<PathBuf>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_true")]
    pub refresh_stats_after_pass: bool,

    #[serde(default = "default_crawl_page_delay_ms")]
    pub crawl_page_delay_ms: u64,

    /// AI-judge newly ingested records and queue the results for review.
    #[serde(default)]
    pub auto_judge_new_records: bool,

    #[serde(default = "default_pending_ttl_days")]
    pub pending_ttl_days: i64,

    #[serde(default)]
    pub feeds: Vec<FeedSourceConfig>,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("riskwatch");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("riskwatch.db").to_string_lossy().to_string()
}

fn default_ai_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_ai_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_ai_call_delay_ms() -> u64 {
    1000
}

fn default_ai_limit() -> usize {
    DEFAULT_AI_LIMIT
}

fn default_keyword_file() -> PathBuf {
    data_dir().join("keywords.txt")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

fn default_crawl_page_delay_ms() -> u64 {
    1000
}

fn default_pending_ttl_days() -> i64 {
    PENDING_TTL_DAYS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            claude_api_key: None,
            ai_api_url: default_ai_api_url(),
            ai_model: default_ai_model(),
            ai_call_delay_ms: default_ai_call_delay_ms(),
            ai_default_limit: default_ai_limit(),
            keyword_file: default_keyword_file(),
            keyword_fallback_paths: Vec::new(),
            chunk_size: default_chunk_size(),
            refresh_stats_after_pass: true,
            crawl_page_delay_ms: default_crawl_page_delay_ms(),
            auto_judge_new_records: false,
            pending_ttl_days: default_pending_ttl_days(),
            feeds: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("riskwatch")
            .join("config.toml")
    }

    pub fn keyword_file(&self) -> KeywordFile {
        KeywordFile::new(&self.keyword_file).with_fallbacks(self.keyword_fallback_paths.clone())
    }
}
