// src/ingest/providers/rss.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::PipelineError;
use crate::ingest::normalize_text;
use crate::ingest::retry::{Params, ResilientFetcher};
use crate::ingest::types::{RawItem, Source, SourceProvider, SourceQuery};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    DateTime::from_timestamp(dt.unix_timestamp(), 0)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn mentions_any(item: &RawItem, terms: &[String]) -> bool {
    if terms.is_empty() {
        return true;
    }
    let hay = format!(
        "{} {}",
        item.title.as_deref().unwrap_or_default(),
        item.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .any(|t| !t.is_empty() && hay.contains(&t))
}

/// Parse one RSS 2.0 document into news items keyed by link.
pub fn parse_feed(xml: &str, fetched_at: DateTime<Utc>) -> Result<Vec<RawItem>, PipelineError> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| PipelineError::Decode {
        service: "rss".into(),
        detail: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let Some(link) = it.link.as_deref().map(str::trim).filter(|l| !l.is_empty()) else {
            continue;
        };
        let published_at = it
            .pub_date
            .as_deref()
            .and_then(parse_rfc2822)
            .unwrap_or(fetched_at);
        let mut item = RawItem::new(link, Source::News, published_at);
        item.title = it.title.as_deref().map(normalize_text).filter(|s| !s.is_empty());
        item.description = it
            .description
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty());
        if item.title.is_none() && item.description.is_none() {
            continue;
        }
        item.raw_payload = serde_json::json!({
            "title": it.title,
            "link": it.link,
            "pubDate": it.pub_date,
            "description": it.description,
        });
        out.push(item);
    }
    Ok(out)
}

/// Keyword-filtered RSS feeds; fallback when no NewsAPI key is configured.
pub struct RssProvider {
    fetcher: ResilientFetcher,
    feeds: Vec<String>,
}

impl RssProvider {
    pub fn new(fetcher: ResilientFetcher, feeds: Vec<String>) -> Self {
        Self { fetcher, feeds }
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        let feeds = if query.scopes.is_empty() {
            &self.feeds
        } else {
            &query.scopes
        };
        if feeds.is_empty() {
            return Err(PipelineError::Config("no rss feeds configured".into()));
        }

        let now = Utc::now();
        let mut out = Vec::new();
        let mut last_err = None;
        for url in feeds {
            match self.fetcher.get_text("rss", url, &[], &Params::new()).await {
                Ok(body) => match parse_feed(&body, now) {
                    Ok(items) => out.extend(items.into_iter().filter(|i| mentions_any(i, &query.terms))),
                    Err(e) => tracing::warn!(error = %e, feed = %url, "feed parse error"),
                },
                Err(e) => {
                    tracing::warn!(error = %e, feed = %url, "feed unavailable");
                    last_err = Some(e);
                }
            }
        }

        // Every feed down: surface the remote failure instead of an empty batch.
        if out.is_empty() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        if query.limit > 0 {
            out.truncate(query.limit);
        }
        Ok(out)
    }

    fn source(&self) -> Source {
        Source::News
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}
