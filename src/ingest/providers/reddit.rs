// src/ingest/providers/reddit.rs
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::or_query;
use crate::error::PipelineError;
use crate::ingest::retry::{Params, ResilientFetcher};
use crate::ingest::types::{RawItem, Source, SourceProvider, SourceQuery};

pub const BASE_URL: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    author: Option<String>,
    created_utc: Option<f64>,
}

/// Map a subreddit search listing to items.
pub fn parse_search_listing(
    body: &str,
    fetched_at: DateTime<Utc>,
) -> Result<Vec<RawItem>, PipelineError> {
    let listing: Listing = serde_json::from_str(body).map_err(|e| PipelineError::Decode {
        service: "reddit".into(),
        detail: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(listing.data.children.len());
    for child in listing.data.children {
        let post: Post = match serde_json::from_value(child.data.clone()) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed reddit post");
                continue;
            }
        };
        let published_at = post
            .created_utc
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or(fetched_at);
        let mut item = RawItem::new(post.id, Source::Reddit, published_at);
        item.title = post.title.filter(|s| !s.trim().is_empty());
        item.body = post.selftext.filter(|s| !s.trim().is_empty());
        item.author = post.author;
        item.raw_payload = child.data;
        out.push(item);
    }
    Ok(out)
}

/// Public subreddit search (`/r/a+b/search.json`), newest first.
pub struct RedditProvider {
    fetcher: ResilientFetcher,
    default_subreddits: Vec<String>,
    base_url: String,
}

impl RedditProvider {
    pub fn new(fetcher: ResilientFetcher, default_subreddits: Vec<String>) -> Self {
        Self {
            fetcher,
            default_subreddits,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn search_url(&self, query: &SourceQuery) -> String {
        let subs = if query.scopes.is_empty() {
            &self.default_subreddits
        } else {
            &query.scopes
        };
        format!(
            "{}/r/{}/search.json",
            self.base_url.trim_end_matches('/'),
            subs.join("+")
        )
    }

    pub fn build_params(&self, query: &SourceQuery) -> Params {
        let mut params = Params::new();
        params.insert("q".into(), or_query(&query.terms));
        params.insert("restrict_sr".into(), "1".into());
        params.insert("sort".into(), "new".into());
        params.insert("limit".into(), query.limit.clamp(1, 100).to_string());
        params
    }
}

#[async_trait]
impl SourceProvider for RedditProvider {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        let url = self.search_url(query);
        let params = self.build_params(query);
        tracing::info!(q = %params["q"], url = %url, "searching reddit");
        let body = self.fetcher.get_text("reddit", &url, &[], &params).await?;
        parse_search_listing(&body, Utc::now())
    }

    fn source(&self) -> Source {
        Source::Reddit
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::retry::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn url_joins_subreddits_and_prefers_query_scopes() {
        let fetcher =
            ResilientFetcher::new(RetryPolicy::default(), Duration::from_secs(5), "test").unwrap();
        let p = RedditProvider::new(fetcher, vec!["stocks".into(), "investing".into()]);
        let mut q = SourceQuery {
            terms: vec!["TSLA".into()],
            scopes: vec![],
            limit: 50,
        };
        assert_eq!(
            p.search_url(&q),
            "https://www.reddit.com/r/stocks+investing/search.json"
        );
        q.scopes = vec!["wallstreetbets".into()];
        assert_eq!(
            p.search_url(&q),
            "https://www.reddit.com/r/wallstreetbets/search.json"
        );
    }
}
