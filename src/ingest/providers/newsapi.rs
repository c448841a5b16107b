// src/ingest/providers/newsapi.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{or_query, parse_rfc3339_or};
use crate::error::PipelineError;
use crate::ingest::normalize_text;
use crate::ingest::retry::{Params, ResilientFetcher};
use crate::ingest::types::{RawItem, Source, SourceProvider, SourceQuery};

pub const EVERYTHING_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    author: Option<String>,
    published_at: Option<String>,
}

fn clean(field: Option<String>) -> Option<String> {
    field.map(|s| normalize_text(&s)).filter(|s| !s.is_empty())
}

/// Map an `/v2/everything` payload to items keyed by article url.
pub fn parse_everything(
    body: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<RawItem>, PipelineError> {
    let resp: EverythingResponse =
        serde_json::from_str(body).map_err(|e| PipelineError::Decode {
            service: "newsapi".into(),
            detail: e.to_string(),
        })?;
    if resp.status != "ok" {
        return Err(PipelineError::Decode {
            service: "newsapi".into(),
            detail: resp.message.unwrap_or_else(|| format!("status {}", resp.status)),
        });
    }

    let mut out = Vec::with_capacity(resp.articles.len());
    for raw in resp.articles {
        let article: Article = match serde_json::from_value(raw.clone()) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed article");
                continue;
            }
        };
        let Some(url) = article.url.filter(|u| !u.trim().is_empty()) else {
            continue;
        };
        let mut item = RawItem::new(
            url,
            Source::News,
            parse_rfc3339_or(article.published_at.as_deref(), fetched_at),
        );
        item.title = clean(article.title);
        item.description = clean(article.description);
        item.content = clean(article.content);
        item.author = article.author;
        item.raw_payload = raw;
        out.push(item);
    }
    Ok(out)
}

/// NewsAPI.org keyword search (primary news source).
pub struct NewsApiProvider {
    fetcher: ResilientFetcher,
    api_key: String,
    language: String,
    url: String,
}

impl NewsApiProvider {
    pub fn new(fetcher: ResilientFetcher, api_key: String, language: String) -> Self {
        Self {
            fetcher,
            api_key,
            language,
            url: EVERYTHING_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn build_params(&self, query: &SourceQuery) -> Params {
        let mut params = Params::new();
        params.insert("q".into(), or_query(&query.terms));
        params.insert("language".into(), self.language.clone());
        params.insert("sortBy".into(), "publishedAt".into());
        params.insert("pageSize".into(), query.limit.clamp(1, 100).to_string());
        params
    }
}

#[async_trait]
impl SourceProvider for NewsApiProvider {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        if self.api_key.is_empty() {
            return Err(PipelineError::Config("newsapi key is empty".into()));
        }
        let params = self.build_params(query);
        let headers = [("X-Api-Key", self.api_key.clone())];
        let body = self
            .fetcher
            .get_text("newsapi", &self.url, &headers, &params)
            .await?;
        let items = parse_everything(&body, Utc::now())?;
        tracing::info!(count = items.len(), q = %params["q"], "fetched news articles");
        Ok(items)
    }

    fn source(&self) -> Source {
        Source::News
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_is_reported() {
        let body = r#"{"status":"error","code":"apiKeyInvalid","message":"Your API key is invalid."}"#;
        let err = parse_everything(body, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("API key is invalid"));
    }

    #[test]
    fn articles_without_url_are_dropped() {
        let body = r#"{"status":"ok","totalResults":2,"articles":[
            {"url":null,"title":"no id"},
            {"url":"https://example.test/a","title":"Apple &amp; chips","description":"<b>AAPL</b> up"}
        ]}"#;
        let items = parse_everything(body, Utc::now()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "https://example.test/a");
        assert_eq!(items[0].title.as_deref(), Some("Apple & chips"));
        assert_eq!(items[0].description.as_deref(), Some("AAPL up"));
    }
}
