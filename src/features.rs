// src/features.rs
//! Feature table: prices left-joined with per-ticker sentiment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::aggregate::SentimentSummaries;
use crate::artifacts::write_atomic;
use crate::error::PipelineError;
use crate::prices::PriceBook;
use crate::sentiment::Sentiment;

pub const FEATURE_COLUMNS: [&str; 4] = ["ticker", "price", "timestamp", "avg_sentiment"];
pub const LABEL_COLUMN: &str = "label";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub ticker: String,
    pub price: f64,
    pub timestamp: String,
    pub avg_sentiment: f64,
}

/// Sentiment used for tickers with a price but no tagged mention.
pub fn neutral_sentiment() -> f64 {
    f64::from(Sentiment::Neutral.encoded())
}

/// One row per priced ticker, in ticker order. Sentiment is optional enrichment.
pub fn build(
    summaries: &SentimentSummaries,
    prices: &PriceBook,
) -> Result<Vec<FeatureRow>, PipelineError> {
    if prices.is_empty() {
        return Err(PipelineError::MissingPriceData(
            "price snapshot set is empty; nothing to join sentiment against".into(),
        ));
    }

    let mut unmatched = 0usize;
    let rows: Vec<FeatureRow> = prices
        .iter()
        .map(|(ticker, quote)| {
            let avg_sentiment = match summaries.get(ticker) {
                Some(s) => s.avg_sentiment,
                None => {
                    unmatched += 1;
                    neutral_sentiment()
                }
            };
            FeatureRow {
                ticker: ticker.clone(),
                price: quote.price,
                timestamp: quote.timestamp.clone(),
                avg_sentiment,
            }
        })
        .collect();

    tracing::info!(rows = rows.len(), without_sentiment = unmatched, "feature rows built");
    Ok(rows)
}

pub fn to_csv(rows: &[FeatureRow]) -> Result<Vec<u8>, PipelineError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    // serialize() emits the header from the field names on the first row
    if rows.is_empty() {
        wtr.write_record(FEATURE_COLUMNS)?;
    }
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

pub fn write_feature_table(path: &Path, rows: &[FeatureRow]) -> Result<(), PipelineError> {
    write_atomic(path, &to_csv(rows)?)
}

/// A feature table as read back from disk, with the label column when present.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    /// Raw `label` cells, one per row, when the file has that column.
    pub labels: Option<Vec<String>>,
}

pub fn read_feature_table(path: &Path) -> Result<FeatureTable, PipelineError> {
    let data = std::fs::read(path)?;
    parse_feature_table(&data)
}

pub fn parse_feature_table(data: &[u8]) -> Result<FeatureTable, PipelineError> {
    let mut rdr = csv::Reader::from_reader(data);
    let headers = rdr.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);

    let mut idx = [0usize; 4];
    for (slot, name) in idx.iter_mut().zip(FEATURE_COLUMNS) {
        *slot = col(name)
            .ok_or_else(|| PipelineError::InvalidTable(format!("missing column '{name}'")))?;
    }
    let label_idx = col(LABEL_COLUMN);

    let mut rows = Vec::new();
    let mut labels = label_idx.map(|_| Vec::new());
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let cell = |i: usize| rec.get(i).unwrap_or("").trim();
        let num = |i: usize, name: &str| -> Result<f64, PipelineError> {
            cell(i).parse::<f64>().map_err(|e| {
                PipelineError::InvalidTable(format!("row {}: bad {name} '{}': {e}", line + 1, cell(i)))
            })
        };
        rows.push(FeatureRow {
            ticker: cell(idx[0]).to_string(),
            price: num(idx[1], "price")?,
            timestamp: cell(idx[2]).to_string(),
            avg_sentiment: num(idx[3], "avg_sentiment")?,
        });
        if let (Some(li), Some(out)) = (label_idx, labels.as_mut()) {
            out.push(cell(li).to_string());
        }
    }
    Ok(FeatureTable { rows, labels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::TickerSummary;
    use crate::prices::PriceQuote;

    fn book(entries: &[(&str, f64, &str)]) -> PriceBook {
        entries
            .iter()
            .map(|(t, p, ts)| {
                (
                    t.to_string(),
                    PriceQuote {
                        price: *p,
                        timestamp: ts.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn missing_sentiment_defaults_to_neutral() {
        let rows = build(&SentimentSummaries::new(), &book(&[("AAPL", 150.0, "T1")])).unwrap();
        assert_eq!(
            rows,
            vec![FeatureRow {
                ticker: "AAPL".into(),
                price: 150.0,
                timestamp: "T1".into(),
                avg_sentiment: 1.0,
            }]
        );
    }

    #[test]
    fn sentiment_without_price_is_dropped() {
        let mut s = SentimentSummaries::new();
        s.insert("TSLA".into(), TickerSummary { avg_sentiment: 2.0, mentions: 1 });
        s.insert("GME".into(), TickerSummary { avg_sentiment: 0.0, mentions: 3 });
        let rows = build(&s, &book(&[("TSLA", 200.0, "T"), ("MSFT", 400.0, "T")])).unwrap();
        let tickers: Vec<_> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["MSFT", "TSLA"]);
        assert_eq!(rows[1].avg_sentiment, 2.0);
    }

    #[test]
    fn empty_prices_is_a_hard_stop() {
        let err = build(&SentimentSummaries::new(), &PriceBook::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingPriceData(_)));
    }

    #[test]
    fn csv_has_fixed_header() {
        let rows = build(&SentimentSummaries::new(), &book(&[("AAPL", 150.0, "T1")])).unwrap();
        let text = String::from_utf8(to_csv(&rows).unwrap()).unwrap();
        assert_eq!(text, "ticker,price,timestamp,avg_sentiment\nAAPL,150.0,T1,1.0\n");
        let back = parse_feature_table(text.as_bytes()).unwrap();
        assert_eq!(back.rows, rows);
        assert!(back.labels.is_none());
    }

    #[test]
    fn reads_label_column_in_any_position() {
        let t = parse_feature_table(b"label,ticker,avg_sentiment,price,timestamp\nBUY,AAPL,1.5,150,T1\n").unwrap();
        assert_eq!(t.rows[0].ticker, "AAPL");
        assert_eq!(t.rows[0].price, 150.0);
        assert_eq!(t.labels, Some(vec!["BUY".to_string()]));
    }

    #[test]
    fn rejects_tables_without_feature_columns() {
        assert!(matches!(
            parse_feature_table(b"ticker,price\nAAPL,1\n"),
            Err(PipelineError::InvalidTable(_))
        ));
    }
}
