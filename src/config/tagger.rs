// src/config/tagger.rs
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{resolve_secret, RetryOverride};
use crate::error::PipelineError;
use crate::ingest::types::{Source, TextField};

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}

/// Which item fields feed the tagger, per source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFieldsConfig {
    pub news: Vec<TextField>,
    pub reddit: Vec<TextField>,
    pub twitter: Vec<TextField>,
}

impl Default for TextFieldsConfig {
    fn default() -> Self {
        Self {
            news: vec![TextField::Title, TextField::Description],
            reddit: vec![TextField::Title, TextField::Body],
            twitter: vec![TextField::Content],
        }
    }
}

impl TextFieldsConfig {
    pub fn for_source(&self, source: Source) -> &[TextField] {
        match source {
            Source::News => &self.news,
            Source::Reddit => &self.reddit,
            Source::Twitter => &self.twitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggerConfig {
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Override for the chat-completions endpoint (proxies, local gateways).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Response cache; omit to disable.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub text_fields: TextFieldsConfig,
    #[serde(default)]
    pub retry: RetryOverride,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            endpoint: None,
            cache_dir: Some(PathBuf::from("cache/enrichment")),
            text_fields: TextFieldsConfig::default(),
            retry: RetryOverride::default(),
        }
    }
}

impl TaggerConfig {
    /// Normalize the provider name and resolve an `"ENV"` api key.
    pub fn resolved(&self) -> Result<Self, PipelineError> {
        let mut cfg = self.clone();
        cfg.provider = cfg.provider.trim().to_lowercase();
        cfg.api_key = match cfg.provider.as_str() {
            "openai" => resolve_secret(&cfg.api_key, "OPENAI_API_KEY")?,
            "mock" => String::new(),
            other => {
                return Err(PipelineError::Config(format!(
                    "unsupported tagger provider in config: {other}"
                )))
            }
        };
        Ok(cfg)
    }
}
