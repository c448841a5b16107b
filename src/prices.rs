// src/prices.rs
//! Price snapshots: one current quote per ticker, overwritten on each fetch.
//!
//! Tickers are discovered from the enriched artifacts, quoted through the
//! Yahoo v8 chart API and saved as `{ticker: {price, timestamp}}` JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::artifacts;
use crate::error::PipelineError;
use crate::ingest::retry::{Params, ResilientFetcher};
use crate::sentiment::EnrichedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    /// ISO-8601.
    pub timestamp: String,
}

/// Ticker → latest quote. Serialized as the price snapshot artifact.
pub type PriceBook = BTreeMap<String, PriceQuote>;

pub fn load_price_book(path: &Path) -> Result<PriceBook, PipelineError> {
    artifacts::load_json(path)
}

pub fn save_price_book(path: &Path, book: &PriceBook) -> Result<(), PipelineError> {
    artifacts::save_json(path, book)
}

/// Unique tickers mentioned anywhere in `items`, sorted.
pub fn collect_tickers(items: &[EnrichedItem]) -> BTreeSet<String> {
    items
        .iter()
        .flat_map(|e| e.tickers.iter().cloned())
        .collect()
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("price_quotes_total", "Tickers quoted successfully.");
        describe_counter!("price_skipped_total", "Tickers skipped for missing or failed quotes.");
    });
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest price for `ticker`; `Ok(None)` when the provider has no data.
    async fn latest(&self, ticker: &str) -> Result<Option<f64>, PipelineError>;
    fn name(&self) -> &'static str;
}

pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Last non-null close of the day, falling back to the meta market price.
pub fn parse_chart_price(ticker: &str, body: &str) -> Result<Option<f64>, PipelineError> {
    let resp: ChartResponse = serde_json::from_str(body).map_err(|e| PipelineError::Decode {
        service: "yahoo".into(),
        detail: format!("{ticker}: {e}"),
    })?;
    let Some(result) = resp.chart.result else {
        return match resp.chart.error {
            Some(err) if err.code == "Not Found" => Ok(None),
            Some(err) => Err(PipelineError::Decode {
                service: "yahoo".into(),
                detail: format!("{ticker}: {}: {}", err.code, err.description),
            }),
            None => Ok(None),
        };
    };
    let Some(data) = result.into_iter().next() else {
        return Ok(None);
    };
    let close = data
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .and_then(|q| q.close.into_iter().rev().flatten().next());
    let price = close.or_else(|| data.meta.and_then(|m| m.regular_market_price));
    Ok(price.filter(|p| p.is_finite()))
}

/// Yahoo answers unknown symbols with a 404 carrying a "Not Found" chart error.
fn chart_price_from(
    ticker: &str,
    fetched: Result<String, PipelineError>,
) -> Result<Option<f64>, PipelineError> {
    match fetched {
        Ok(body) => parse_chart_price(ticker, &body),
        Err(PipelineError::RemoteUnavailable {
            status: Some(404), ..
        }) => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct YahooPriceSource {
    fetcher: ResilientFetcher,
    base_url: String,
}

impl YahooPriceSource {
    pub fn new(fetcher: ResilientFetcher) -> Self {
        Self {
            fetcher,
            base_url: YAHOO_CHART_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: Option<String>) -> Self {
        if let Some(u) = url {
            self.base_url = u.trim_end_matches('/').to_string();
        }
        self
    }
}

#[async_trait::async_trait]
impl PriceSource for YahooPriceSource {
    async fn latest(&self, ticker: &str) -> Result<Option<f64>, PipelineError> {
        let url = format!("{}/{}", self.base_url, ticker);
        let mut params = Params::new();
        params.insert("range".into(), "1d".into());
        params.insert("interval".into(), "1d".into());
        chart_price_from(ticker, self.fetcher.get_text("yahoo", &url, &[], &params).await)
    }

    fn name(&self) -> &'static str {
        "yahoo"
    }
}

/// Quote every ticker; tickers with no data or a failed fetch are logged and left out.
pub async fn fetch_price_book<I>(source: &dyn PriceSource, tickers: I, now: DateTime<Utc>) -> PriceBook
where
    I: IntoIterator<Item = String>,
{
    ensure_metrics_described();
    let stamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut book = PriceBook::new();
    for ticker in tickers {
        match source.latest(&ticker).await {
            Ok(Some(price)) => {
                tracing::info!(%ticker, price, "price fetched");
                counter!("price_quotes_total").increment(1);
                book.insert(
                    ticker,
                    PriceQuote {
                        price,
                        timestamp: stamp.clone(),
                    },
                );
            }
            Ok(None) => {
                tracing::warn!(%ticker, provider = source.name(), "no price data");
                counter!("price_skipped_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(%ticker, error = %e, "could not fetch price");
                counter!("price_skipped_total").increment(1);
            }
        }
    }
    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<&'static str, Result<Option<f64>, ()>>);

    #[async_trait::async_trait]
    impl PriceSource for Fixed {
        async fn latest(&self, ticker: &str) -> Result<Option<f64>, PipelineError> {
            match self.0.get(ticker) {
                Some(Ok(p)) => Ok(*p),
                Some(Err(())) => Err(PipelineError::RemoteUnavailable {
                    service: "fixed".into(),
                    attempts: 1,
                    status: Some(503),
                    detail: "down".into(),
                }),
                None => Ok(None),
            }
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[test]
    fn chart_price_prefers_last_close() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":151.0},
            "indicators":{"quote":[{"close":[149.5,150.25,null]}]}}],"error":null}}"#;
        assert_eq!(parse_chart_price("AAPL", body).unwrap(), Some(150.25));

        let meta_only = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":42.0}}],"error":null}}"#;
        assert_eq!(parse_chart_price("X", meta_only).unwrap(), Some(42.0));
    }

    #[test]
    fn unknown_symbol_has_no_price() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert_eq!(parse_chart_price("ZZZZ", body).unwrap(), None);
        assert!(parse_chart_price("ZZZZ", "<html>").is_err());
    }

    #[test]
    fn not_found_status_means_no_data() {
        let missing = Err(PipelineError::RemoteUnavailable {
            service: "yahoo".into(),
            attempts: 1,
            status: Some(404),
            detail: r#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#.into(),
        });
        assert_eq!(chart_price_from("ZZZZ", missing).unwrap(), None);

        let down = Err(PipelineError::RemoteUnavailable {
            service: "yahoo".into(),
            attempts: 6,
            status: Some(503),
            detail: "unavailable".into(),
        });
        assert!(chart_price_from("AAPL", down).is_err());

        let ok = Ok(r#"{"chart":{"result":[{"meta":{"regularMarketPrice":7.5}}],"error":null}}"#.to_string());
        assert_eq!(chart_price_from("F", ok).unwrap(), Some(7.5));
    }

    #[tokio::test]
    async fn failed_tickers_are_skipped() {
        let src = Fixed(HashMap::from([
            ("AAPL", Ok(Some(150.0))),
            ("TSLA", Err(())),
            ("NOPE", Ok(None)),
        ]));
        let now = DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let book = fetch_price_book(
            &src,
            ["AAPL", "TSLA", "NOPE"].map(String::from),
            now,
        )
        .await;
        assert_eq!(book.len(), 1);
        assert_eq!(book["AAPL"].price, 150.0);
        assert_eq!(book["AAPL"].timestamp, "2025-03-01T12:00:00Z");
    }

    #[test]
    fn book_round_trips_through_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market_prices.json");
        let mut book = PriceBook::new();
        book.insert("BTC-USD".into(), PriceQuote { price: 64000.5, timestamp: "2025-03-01T12:00:00Z".into() });
        save_price_book(&path, &book).unwrap();
        assert_eq!(load_price_book(&path).unwrap(), book);
    }
}
