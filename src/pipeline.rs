// src/pipeline.rs
//! Stage wiring: build components from [`PipelineConfig`] and run the
//! batch stages in order (ingest → tag → prices → features → label).
//!
//! Each stage reads the artifacts of the previous one from disk, so any
//! stage can be re-run on its own.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::aggregate;
use crate::artifacts;
use crate::config::{resolve_secret, PipelineConfig, RetryConfig};
use crate::error::PipelineError;
use crate::features::{self, FeatureRow};
use crate::ingest::providers::newsapi::NewsApiProvider;
use crate::ingest::providers::reddit::RedditProvider;
use crate::ingest::providers::rss::RssProvider;
use crate::ingest::providers::twitter::TwitterProvider;
use crate::ingest::retry::ResilientFetcher;
use crate::ingest::types::{Source, SourceProvider, SourceQuery, TextField};
use crate::ingest::{run_ingest, IngestReport};
use crate::label::{self, LabelThresholds, TrainingTable};
use crate::prices::{self, PriceBook, PriceSource, YahooPriceSource};
use crate::sentiment::{build_enrichment_client, SentimentTagger, TagBatch};
use crate::store::RecordStore;

pub const USER_AGENT: &str = concat!("ticker-sentiment-pipeline/", env!("CARGO_PKG_VERSION"));

pub fn build_fetcher(retry: &RetryConfig, user_agent: &str) -> Result<ResilientFetcher, PipelineError> {
    ResilientFetcher::new(retry.policy(), retry.timeout(), user_agent)
}

/// Provider for `source`, with credentials resolved from config/env.
pub fn build_provider(
    cfg: &PipelineConfig,
    source: Source,
) -> Result<Box<dyn SourceProvider>, PipelineError> {
    let retry = cfg.retry_for(source);
    match source {
        Source::Twitter => {
            let tw = &cfg.sources.twitter;
            let token = resolve_secret(&tw.bearer_token, "TWITTER_BEARER_TOKEN")?;
            let fetcher = build_fetcher(&retry, USER_AGENT)?;
            Ok(Box::new(TwitterProvider::new(fetcher, token, tw.lang.clone())))
        }
        Source::News => {
            let news = &cfg.sources.news;
            let fetcher = build_fetcher(&retry, USER_AGENT)?;
            let key = if news.api_key.trim().is_empty() {
                None
            } else {
                match resolve_secret(&news.api_key, "NEWSAPI_KEY") {
                    Ok(k) if !k.is_empty() => Some(k),
                    Ok(_) => None,
                    Err(e) if !news.rss_feeds.is_empty() => {
                        tracing::info!(error = %e, "no NewsAPI key, using rss feeds");
                        None
                    }
                    Err(e) => return Err(e),
                }
            };
            match key {
                Some(k) => Ok(Box::new(NewsApiProvider::new(fetcher, k, news.language.clone()))),
                None if !news.rss_feeds.is_empty() => {
                    Ok(Box::new(RssProvider::new(fetcher, news.rss_feeds.clone())))
                }
                None => Err(PipelineError::Config(
                    "news source needs an api key or rss_feeds".into(),
                )),
            }
        }
        Source::Reddit => {
            let rd = &cfg.sources.reddit;
            let fetcher = build_fetcher(&retry, &rd.user_agent)?;
            Ok(Box::new(RedditProvider::new(fetcher, rd.subreddits.clone())))
        }
    }
}

pub fn query_for(cfg: &PipelineConfig, source: Source) -> SourceQuery {
    let (terms, limit) = match source {
        Source::Twitter => (&cfg.sources.twitter.query, cfg.sources.twitter.limit),
        Source::News => (&cfg.sources.news.query, cfg.sources.news.limit),
        Source::Reddit => (&cfg.sources.reddit.query, cfg.sources.reddit.limit),
    };
    SourceQuery {
        terms: terms.clone(),
        scopes: Vec::new(),
        limit,
    }
}

/// Fetch one source and persist it. `RemoteUnavailable` propagates.
pub async fn ingest_source(
    cfg: &PipelineConfig,
    store: &dyn RecordStore,
    source: Source,
) -> Result<IngestReport, PipelineError> {
    let provider = build_provider(cfg, source)?;
    run_ingest(provider.as_ref(), &query_for(cfg, source), store).await
}

pub fn build_tagger(cfg: &PipelineConfig) -> Result<SentimentTagger, PipelineError> {
    let tagger_cfg = cfg.tagger.resolved()?;
    let retry = cfg.retry.with_override(&tagger_cfg.retry);
    let fetcher = build_fetcher(&retry, USER_AGENT)?;
    let client = build_enrichment_client(&tagger_cfg, fetcher)?;
    Ok(SentimentTagger::new(client))
}

/// Tag every stored item of one source and write its enriched artifact.
///
/// An enrichment-service failure aborts before anything is written, so the
/// previous artifact stays in place.
pub async fn tag_source(
    tagger: &SentimentTagger,
    store: &dyn RecordStore,
    source: Source,
    fields: &[TextField],
    out: &Path,
) -> Result<TagBatch, PipelineError> {
    let items = store.load(source)?;
    if items.is_empty() {
        tracing::warn!(%source, "no stored items to tag");
    }
    let batch = tagger.tag_batch(items, fields).await?;
    artifacts::save_enriched(out, &batch.items)?;
    tracing::info!(%source, path = %out.display(), items = batch.items.len(), "enriched artifact written");
    Ok(batch)
}

pub fn enriched_paths(cfg: &PipelineConfig) -> Vec<PathBuf> {
    Source::ALL
        .iter()
        .map(|s| cfg.storage.enriched_path(*s))
        .collect()
}

/// Quote every ticker found in the enriched artifacts and save the snapshot.
///
/// With no tickers at all nothing is fetched, and when no ticker gets a quote
/// the previous snapshot is left untouched.
pub async fn refresh_prices(
    source: &dyn PriceSource,
    enriched: &[PathBuf],
    out: &Path,
) -> Result<PriceBook, PipelineError> {
    let items = artifacts::load_enriched_many(enriched)?;
    let tickers = prices::collect_tickers(&items);
    if tickers.is_empty() {
        tracing::warn!("no tickers found in enriched artifacts, skipping price fetch");
        return Ok(PriceBook::new());
    }
    tracing::info!(tickers = tickers.len(), provider = source.name(), "fetching prices");
    let tried = tickers.len();
    let book = prices::fetch_price_book(source, tickers, Utc::now()).await;
    if book.is_empty() {
        tracing::warn!(
            tickers = tried,
            path = %out.display(),
            "no ticker could be priced, keeping previous snapshot"
        );
        return Ok(book);
    }
    prices::save_price_book(out, &book)?;
    Ok(book)
}

pub fn build_price_source(cfg: &PipelineConfig) -> Result<YahooPriceSource, PipelineError> {
    let retry = cfg.retry.with_override(&cfg.sources.prices.retry);
    let fetcher = build_fetcher(&retry, USER_AGENT)?;
    Ok(YahooPriceSource::new(fetcher).with_base_url(cfg.sources.prices.chart_url.clone()))
}

/// Aggregate sentiment, join it onto the price snapshot and write the feature table.
///
/// Hard stops leave no file behind.
pub fn build_features(
    enriched: &[PathBuf],
    prices_path: &Path,
    out: &Path,
) -> Result<Vec<FeatureRow>, PipelineError> {
    let items = artifacts::load_enriched_many(enriched)?;
    if items.is_empty() {
        return Err(PipelineError::NoSentimentData(format!(
            "no enriched items found in {}",
            display_paths(enriched)
        )));
    }
    let summaries = aggregate::aggregate(&items)?;

    let book = if prices_path.exists() {
        prices::load_price_book(prices_path)?
    } else {
        return Err(PipelineError::MissingPriceData(format!(
            "price snapshot {} does not exist",
            prices_path.display()
        )));
    };
    let rows = features::build(&summaries, &book).map_err(|e| match e {
        PipelineError::MissingPriceData(msg) => {
            PipelineError::MissingPriceData(format!("{msg} ({})", prices_path.display()))
        }
        other => other,
    })?;

    features::write_feature_table(out, &rows)?;
    tracing::info!(path = %out.display(), rows = rows.len(), "feature table written");
    Ok(rows)
}

pub fn build_training(
    features_path: &Path,
    thresholds: &LabelThresholds,
    out: &Path,
) -> Result<TrainingTable, PipelineError> {
    let table = features::read_feature_table(features_path)?;
    let training = label::prepare_training_table(table, thresholds)?;
    label::write_training_table(out, &training)?;
    tracing::info!(path = %out.display(), rows = training.rows.len(), "training table written");
    Ok(training)
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NewsConfig;

    #[test]
    fn query_uses_source_settings() {
        let cfg = PipelineConfig::default();
        let q = query_for(&cfg, Source::Reddit);
        assert_eq!(q.limit, 50);
        assert!(q.terms.iter().any(|t| t == "TSLA"));
        assert!(q.scopes.is_empty());
    }

    #[test]
    fn news_without_key_or_feeds_is_a_config_error() {
        let mut cfg = PipelineConfig::default();
        cfg.sources.news = NewsConfig {
            api_key: String::new(),
            rss_feeds: vec![],
            ..NewsConfig::default()
        };
        assert!(matches!(
            build_provider(&cfg, Source::News),
            Err(PipelineError::Config(_))
        ));

        cfg.sources.news.rss_feeds = vec!["https://example.com/feed.xml".into()];
        let p = build_provider(&cfg, Source::News).unwrap();
        assert_eq!(p.name(), "rss");
    }
}
