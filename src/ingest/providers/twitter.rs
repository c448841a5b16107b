// src/ingest/providers/twitter.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{or_query, parse_rfc3339_or};
use crate::error::PipelineError;
use crate::ingest::retry::{Params, ResilientFetcher};
use crate::ingest::types::{RawItem, Source, SourceProvider, SourceQuery};

pub const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<String>,
    author_id: Option<String>,
}

/// Map a v2 recent-search payload to items. Tweets missing `id`/`text` are skipped.
pub fn parse_recent_search(
    body: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<RawItem>, PipelineError> {
    let resp: SearchResponse = serde_json::from_str(body).map_err(|e| PipelineError::Decode {
        service: "twitter".into(),
        detail: e.to_string(),
    })?;

    let mut out = Vec::new();
    for raw in resp.data.unwrap_or_default() {
        let tweet: Tweet = match serde_json::from_value(raw.clone()) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed tweet");
                continue;
            }
        };
        let mut item = RawItem::new(
            tweet.id,
            Source::Twitter,
            parse_rfc3339_or(tweet.created_at.as_deref(), fetched_at),
        );
        item.content = Some(tweet.text);
        item.author = tweet.author_id;
        item.raw_payload = raw;
        out.push(item);
    }
    Ok(out)
}

/// Twitter API v2 recent search, bearer-token auth.
pub struct TwitterProvider {
    fetcher: ResilientFetcher,
    bearer_token: String,
    lang: Option<String>,
    url: String,
}

impl TwitterProvider {
    pub fn new(fetcher: ResilientFetcher, bearer_token: String, lang: Option<String>) -> Self {
        Self {
            fetcher,
            bearer_token,
            lang,
            url: SEARCH_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn build_params(&self, query: &SourceQuery) -> Params {
        let mut q = or_query(&query.terms);
        if query.terms.len() > 1 {
            q = format!("({q})");
        }
        if let Some(lang) = self.lang.as_deref().filter(|l| !l.is_empty()) {
            q = format!("{q} lang:{lang}");
        }
        // The endpoint accepts 10..=100 per page.
        let max_results = query.limit.clamp(10, 100);

        let mut params = Params::new();
        params.insert("query".into(), q);
        params.insert("max_results".into(), max_results.to_string());
        params.insert("tweet.fields".into(), "created_at,lang,author_id".into());
        params
    }
}

#[async_trait]
impl SourceProvider for TwitterProvider {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        if self.bearer_token.is_empty() {
            return Err(PipelineError::Config("twitter bearer token is empty".into()));
        }
        let params = self.build_params(query);
        let headers = [("Authorization", format!("Bearer {}", self.bearer_token))];
        let body = self
            .fetcher
            .get_text("twitter", &self.url, &headers, &params)
            .await?;
        let items = parse_recent_search(&body, Utc::now())?;
        tracing::info!(count = items.len(), query = %params["query"], "fetched tweets");
        Ok(items)
    }

    fn source(&self) -> Source {
        Source::Twitter
    }

    fn name(&self) -> &'static str {
        "twitter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::retry::RetryPolicy;
    use std::time::Duration;

    fn provider(lang: Option<&str>) -> TwitterProvider {
        let fetcher =
            ResilientFetcher::new(RetryPolicy::default(), Duration::from_secs(5), "test").unwrap();
        TwitterProvider::new(fetcher, "token".into(), lang.map(str::to_string))
    }

    #[test]
    fn params_add_lang_and_cap_page_size() {
        let q = SourceQuery {
            terms: vec!["bitcoin".into(), "BTC".into()],
            scopes: vec![],
            limit: 500,
        };
        let p = provider(Some("en")).build_params(&q);
        assert_eq!(p["query"], "(bitcoin OR BTC) lang:en");
        assert_eq!(p["max_results"], "100");

        let single = SourceQuery {
            terms: vec!["bitcoin".into()],
            scopes: vec![],
            limit: 3,
        };
        let p = provider(None).build_params(&single);
        assert_eq!(p["query"], "bitcoin");
        assert_eq!(p["max_results"], "10");
    }

    #[test]
    fn empty_search_result_yields_no_items() {
        let items = parse_recent_search(r#"{"meta":{"result_count":0}}"#, Utc::now()).unwrap();
        assert!(items.is_empty());
    }
}
