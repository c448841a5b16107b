// src/sentiment/mod.rs
//! Sentiment tagging: enrichment-service boundary, response parsing and the
//! batch tagger that attaches {sentiment, tickers} to raw items.

pub mod enrichment;
pub mod tagger;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::ingest::types::RawItem;

pub use enrichment::{build_enrichment_client, DynEnrichmentClient, EnrichmentClient};
pub use tagger::{SentimentTagger, TagBatch};

/// Three-way sentiment with a fixed numeric encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    /// Negative=0, Neutral=1, Positive=2. Downstream means depend on this never changing.
    pub fn encoded(self) -> u8 {
        match self {
            Sentiment::Negative => 0,
            Sentiment::Neutral => 1,
            Sentiment::Positive => 2,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
            Sentiment::Positive => "Positive",
        };
        f.write_str(s)
    }
}

/// Parsed enrichment result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResult {
    pub sentiment: Sentiment,
    pub tickers: Vec<String>,
}

impl Default for TagResult {
    fn default() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            tickers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    EmptyInput,
    Malformed(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::EmptyInput => f.write_str("empty input"),
            DegradeReason::Malformed(m) => write!(f, "malformed response: {m}"),
        }
    }
}

/// Outcome of a single `tag` call. A degraded outcome still yields the neutral default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    Parsed(TagResult),
    Degraded(DegradeReason),
}

impl TagOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, TagOutcome::Degraded(_))
    }

    pub fn result(&self) -> TagResult {
        match self {
            TagOutcome::Parsed(r) => r.clone(),
            TagOutcome::Degraded(_) => TagResult::default(),
        }
    }

    pub fn into_result(self) -> TagResult {
        match self {
            TagOutcome::Parsed(r) => r,
            TagOutcome::Degraded(_) => TagResult::default(),
        }
    }
}

/// A raw item plus its tag result. Serialized flat, as in the enriched artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub item: RawItem,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub tickers: Vec<String>,
    /// True when the tag fell back to the neutral default.
    #[serde(default)]
    pub degraded: bool,
}

impl EnrichedItem {
    pub fn new(item: RawItem, outcome: TagOutcome) -> Self {
        let degraded = outcome.is_degraded();
        let TagResult { sentiment, tickers } = outcome.into_result();
        Self {
            item,
            sentiment,
            tickers,
            degraded,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireTag {
    sentiment: Sentiment,
    tickers: Vec<String>,
}

/// Strip one surrounding markdown code fence, if the model added one.
fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Upper-case, trim, drop blanks and duplicates (first occurrence wins).
pub fn normalize_tickers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for t in raw {
        let t = t.as_ref().trim().trim_start_matches('$').to_ascii_uppercase();
        if t.is_empty() {
            continue;
        }
        if seen.insert(t.clone()) {
            out.push(t);
        }
    }
    out
}

/// Parse the strict `{"sentiment": .., "tickers": [..]}` contract.
pub fn parse_tag_response(raw: &str) -> Result<TagResult, PipelineError> {
    let body = strip_code_fence(raw);
    let wire: WireTag = serde_json::from_str(body)
        .map_err(|e| PipelineError::EnrichmentParseFailure(e.to_string()))?;
    Ok(TagResult {
        sentiment: wire.sentiment,
        tickers: normalize_tickers(wire.tickers),
    })
}
