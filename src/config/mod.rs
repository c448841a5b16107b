// src/config/mod.rs
//! Pipeline configuration: one explicit object handed to each component.
//!
//! Loaded from TOML via `$PIPELINE_CONFIG_PATH`, else `config/pipeline.toml`,
//! else built-in defaults. Credentials set to `"ENV"` are read from the
//! environment when the component that needs them is built.

pub mod tagger;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::ingest::retry::RetryPolicy;
use crate::ingest::types::Source;
use crate::label::LabelThresholds;

pub use tagger::{TaggerConfig, TextFieldsConfig};

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// `"ENV"` → value of `env_var`; anything else is taken literally.
pub fn resolve_secret(raw: &str, env_var: &str) -> Result<String, PipelineError> {
    if raw.trim().eq_ignore_ascii_case("env") {
        std::env::var(env_var)
            .map(|v| v.trim().to_string())
            .map_err(|_| PipelineError::Config(format!("missing {env_var} env var")))
    } else {
        Ok(raw.trim().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub processed_dir: PathBuf,
    pub features_path: PathBuf,
    pub training_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/ingest.db"),
            processed_dir: PathBuf::from("data/processed"),
            features_path: PathBuf::from("data/features/features_dataset.csv"),
            training_path: PathBuf::from("data/features/training_dataset.csv"),
        }
    }
}

impl StorageConfig {
    pub fn enriched_path(&self, source: Source) -> PathBuf {
        self.processed_dir
            .join(format!("{}_with_sentiment.json", source.as_str()))
    }

    pub fn prices_path(&self) -> PathBuf {
        self.processed_dir.join("market_prices.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub rate_limit_ceiling_secs: u64,
    pub server_error_ceiling_secs: u64,
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_ms: 1_000,
            rate_limit_ceiling_secs: 60,
            server_error_ceiling_secs: 30,
            timeout_secs: 15,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            rate_limit_ceiling: Duration::from_secs(self.rate_limit_ceiling_secs),
            server_error_ceiling: Duration::from_secs(self.server_error_ceiling_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Apply a call-site override on top of the shared settings.
    pub fn with_override(&self, o: &RetryOverride) -> RetryConfig {
        RetryConfig {
            max_attempts: o.max_attempts.unwrap_or(self.max_attempts),
            base_delay_ms: self.base_delay_ms,
            rate_limit_ceiling_secs: o
                .rate_limit_ceiling_secs
                .unwrap_or(self.rate_limit_ceiling_secs),
            server_error_ceiling_secs: o
                .server_error_ceiling_secs
                .unwrap_or(self.server_error_ceiling_secs),
            timeout_secs: o.timeout_secs.unwrap_or(self.timeout_secs),
        }
    }
}

/// Per-source retry tweaks; unset fields inherit `[retry]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub rate_limit_ceiling_secs: Option<u64>,
    pub server_error_ceiling_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    /// "ENV" means: read from TWITTER_BEARER_TOKEN
    pub bearer_token: String,
    pub lang: Option<String>,
    pub query: Vec<String>,
    pub limit: usize,
    pub retry: RetryOverride,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            bearer_token: "ENV".into(),
            lang: Some("en".into()),
            query: vec!["bitcoin".into()],
            limit: 100,
            retry: RetryOverride::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    /// "ENV" means: read from NEWSAPI_KEY. Empty disables NewsAPI and uses `rss_feeds`.
    pub api_key: String,
    pub language: String,
    pub rss_feeds: Vec<String>,
    pub query: Vec<String>,
    pub limit: usize,
    pub retry: RetryOverride,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key: "ENV".into(),
            language: "en".into(),
            rss_feeds: Vec::new(),
            query: vec![
                "Tesla".into(),
                "Apple".into(),
                "Bitcoin".into(),
            ],
            limit: 50,
            retry: RetryOverride::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
    pub subreddits: Vec<String>,
    pub query: Vec<String>,
    pub limit: usize,
    pub retry: RetryOverride,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "ticker-sentiment-pipeline/0.1".into(),
            subreddits: vec![
                "stocks".into(),
                "wallstreetbets".into(),
                "investing".into(),
                "cryptocurrency".into(),
            ],
            query: vec![
                "Tesla".into(),
                "TSLA".into(),
                "Bitcoin".into(),
                "BTC".into(),
                "AAPL".into(),
                "Apple".into(),
            ],
            limit: 50,
            retry: RetryOverride::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Override for the chart endpoint base (`{base}/{ticker}`).
    pub chart_url: Option<String>,
    pub retry: RetryOverride,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub twitter: TwitterConfig,
    pub news: NewsConfig,
    pub reddit: RedditConfig,
    pub prices: PriceConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Prometheus text snapshot written at the end of each CLI run.
    pub metrics_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub retry: RetryConfig,
    pub tagger: TaggerConfig,
    pub labels: LabelThresholds,
    pub sources: SourcesConfig,
    pub telemetry: TelemetryConfig,
}

impl PipelineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing pipeline config {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(s)?;
        cfg.labels = cfg.labels.sanitized();
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $PIPELINE_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            return Self::load_from(&fallback);
        }
        Ok(Self::default())
    }

    pub fn retry_for(&self, source: Source) -> RetryConfig {
        let o = match source {
            Source::News => &self.sources.news.retry,
            Source::Reddit => &self.sources.reddit.retry,
            Source::Twitter => &self.sources.twitter.retry,
        };
        self.retry.with_override(o)
    }
}
