// src/aggregate.rs
//! Ticker/sentiment aggregation: fan enriched items out per ticker and
//! average the encoded sentiment for each symbol.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::ingest::types::Source;
use crate::sentiment::EnrichedItem;

/// One row per (item, ticker) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerSentimentRecord {
    pub ticker: String,
    pub sentiment_encoded: u8,
    pub source: Source,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickerSummary {
    /// Mean of `sentiment_encoded`, in [0, 2].
    pub avg_sentiment: f64,
    pub mentions: usize,
}

/// Per-ticker summaries, ordered by ticker.
pub type SentimentSummaries = BTreeMap<String, TickerSummary>;

/// Items without tickers contribute nothing.
pub fn fan_out(items: &[EnrichedItem]) -> Vec<TickerSentimentRecord> {
    items
        .iter()
        .flat_map(|e| {
            let code = e.sentiment.encoded();
            e.tickers.iter().map(move |t| TickerSentimentRecord {
                ticker: t.clone(),
                sentiment_encoded: code,
                source: e.item.source,
                published_at: e.item.published_at,
            })
        })
        .collect()
}

pub fn summarize(records: &[TickerSentimentRecord]) -> SentimentSummaries {
    let mut acc: BTreeMap<String, (u64, usize)> = BTreeMap::new();
    for r in records {
        let slot = acc.entry(r.ticker.clone()).or_insert((0, 0));
        slot.0 += u64::from(r.sentiment_encoded);
        slot.1 += 1;
    }
    acc.into_iter()
        .map(|(ticker, (sum, n))| {
            (
                ticker,
                TickerSummary {
                    avg_sentiment: sum as f64 / n as f64,
                    mentions: n,
                },
            )
        })
        .collect()
}

/// Fan out and average. An empty input, or one with no ticker associations
/// at all, is a hard stop.
pub fn aggregate(items: &[EnrichedItem]) -> Result<SentimentSummaries, PipelineError> {
    if items.is_empty() {
        return Err(PipelineError::NoSentimentData(
            "no enriched items were provided".into(),
        ));
    }
    let records = fan_out(items);
    if records.is_empty() {
        return Err(PipelineError::NoSentimentData(format!(
            "none of the {} enriched items mention a ticker",
            items.len()
        )));
    }
    let summaries = summarize(&records);
    tracing::info!(
        items = items.len(),
        records = records.len(),
        tickers = summaries.len(),
        "sentiment aggregated"
    );
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawItem;
    use crate::sentiment::{Sentiment, TagOutcome, TagResult};

    fn enriched(id: &str, sentiment: Sentiment, tickers: &[&str]) -> EnrichedItem {
        let item = RawItem::new(id, Source::Reddit, Utc::now());
        EnrichedItem::new(
            item,
            TagOutcome::Parsed(TagResult {
                sentiment,
                tickers: tickers.iter().map(|t| t.to_string()).collect(),
            }),
        )
    }

    #[test]
    fn mean_per_ticker() {
        let items = vec![
            enriched("a", Sentiment::Positive, &["AAPL", "TSLA"]),
            enriched("b", Sentiment::Negative, &["AAPL"]),
        ];
        let s = aggregate(&items).unwrap();
        assert_eq!(s["AAPL"].avg_sentiment, 1.0);
        assert_eq!(s["AAPL"].mentions, 2);
        assert_eq!(s["TSLA"].avg_sentiment, 2.0);
    }

    #[test]
    fn tickerless_items_fan_out_to_nothing() {
        let items = vec![
            enriched("a", Sentiment::Positive, &[]),
            enriched("b", Sentiment::Neutral, &["BTC-USD"]),
        ];
        let recs = fan_out(&items);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].ticker, "BTC-USD");
        assert_eq!(recs[0].sentiment_encoded, 1);
    }

    #[test]
    fn empty_input_is_a_hard_stop() {
        let err = aggregate(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::NoSentimentData(_)));
        assert!(err.to_string().contains("no enriched items"));
    }

    #[test]
    fn no_tickers_anywhere_is_a_hard_stop() {
        let items = vec![enriched("a", Sentiment::Positive, &[])];
        let err = aggregate(&items).unwrap_err();
        assert!(err.is_hard_stop());
        assert!(err.to_string().contains("mention a ticker"));
    }
}
