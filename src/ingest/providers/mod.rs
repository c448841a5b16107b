// src/ingest/providers/mod.rs
//! Thin source clients. Each one builds a request, runs it through its
//! `ResilientFetcher`, and maps the payload into `RawItem`s. Parsing lives in
//! free functions so fixtures can be checked without the network.

pub mod newsapi;
pub mod reddit;
pub mod rss;
pub mod twitter;

use chrono::{DateTime, Utc};

/// `a OR b OR c`; a single term is returned as-is.
pub(crate) fn or_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub(crate) fn parse_rfc3339_or(ts: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}
