// src/ingest/types.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Where an item was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    News,
    Reddit,
    Twitter,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::News, Source::Reddit, Source::Twitter];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::News => "news",
            Source::Reddit => "reddit",
            Source::Twitter => "twitter",
        }
    }

    /// Record Store table holding this source's items.
    pub fn table(self) -> &'static str {
        match self {
            Source::News => "news_articles",
            Source::Reddit => "reddit_posts",
            Source::Twitter => "tweets",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(Source::News),
            "reddit" => Ok(Source::Reddit),
            "twitter" | "tweets" => Ok(Source::Twitter),
            other => Err(PipelineError::Config(format!("unknown source '{other}'"))),
        }
    }
}

/// Text-bearing fields a tagger can read from an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextField {
    Title,
    Body,
    Description,
    Content,
}

/// One ingested record, as persisted in the Record Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Natural id, unique within its source.
    pub id: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Provider payload exactly as received, kept for lossless replay.
    #[serde(default)]
    pub raw_payload: serde_json::Value,
}

impl RawItem {
    pub fn new(id: impl Into<String>, source: Source, published_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            source,
            title: None,
            body: None,
            description: None,
            content: None,
            author: None,
            published_at,
            raw_payload: serde_json::Value::Null,
        }
    }

    pub fn field(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::Title => self.title.as_deref(),
            TextField::Body => self.body.as_deref(),
            TextField::Description => self.description.as_deref(),
            TextField::Content => self.content.as_deref(),
        }
    }

    /// Space-joins the requested fields in order, skipping empty ones.
    pub fn compose_text(&self, fields: &[TextField]) -> String {
        fields
            .iter()
            .filter_map(|f| self.field(*f))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Search parameters handed to a provider.
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    /// Keywords or tickers; providers OR them together.
    pub terms: Vec<String>,
    /// Provider-specific scopes (subreddits, feed urls). Empty = provider default.
    pub scopes: Vec<String>,
    pub limit: usize,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError>;
    fn source(&self) -> Source;
    fn name(&self) -> &'static str;
}
