// src/sentiment/tagger.rs
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use super::{parse_tag_response, DegradeReason, DynEnrichmentClient, EnrichedItem, TagOutcome};
use crate::error::PipelineError;
use crate::ingest::types::{RawItem, TextField};

const PROMPT_TEMPLATE: &str = r#"You are a financial sentiment and ticker analyzer.

Task:
1. Classify the sentiment of the following text as Positive, Negative, or Neutral.
2. Extract any stock or crypto tickers mentioned (e.g. AAPL, TSLA, BTC-USD).
3. If no tickers are found, return an empty list.

Text: "{text}"

Return ONLY valid JSON, with no other keys:
{"sentiment": "Positive" | "Neutral" | "Negative", "tickers": ["..."]}"#;

pub fn build_prompt(text: &str) -> String {
    PROMPT_TEMPLATE.replace("{text}", &text.replace('"', "'"))
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("tagger_items_total", "Items sent through the sentiment tagger.");
        describe_counter!(
            "tagger_degraded_total",
            "Items that fell back to the neutral default."
        );
    });
}

/// Items tagged in one batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct TagBatch {
    pub items: Vec<EnrichedItem>,
    pub degraded: usize,
}

impl TagBatch {
    pub fn parsed(&self) -> usize {
        self.items.len() - self.degraded
    }
}

pub struct SentimentTagger {
    client: DynEnrichmentClient,
}

impl SentimentTagger {
    pub fn new(client: DynEnrichmentClient) -> Self {
        Self { client }
    }

    /// Tag one text. Malformed responses and empty input degrade to Neutral/[];
    /// errors from the enrichment service itself are returned.
    pub async fn tag(&self, text: &str) -> Result<TagOutcome, PipelineError> {
        ensure_metrics_described();
        counter!("tagger_items_total").increment(1);

        let text = text.trim();
        let outcome = if text.is_empty() {
            TagOutcome::Degraded(DegradeReason::EmptyInput)
        } else {
            let raw = self.client.complete(&build_prompt(text)).await.map_err(|e| {
                tracing::error!(
                    error = %e,
                    provider = self.client.provider_name(),
                    "enrichment call failed"
                );
                e
            })?;
            match parse_tag_response(&raw) {
                Ok(r) => TagOutcome::Parsed(r),
                Err(e) => {
                    tracing::warn!(error = %e, "enrichment response degraded to neutral");
                    TagOutcome::Degraded(DegradeReason::Malformed(e.to_string()))
                }
            }
        };

        if outcome.is_degraded() {
            counter!("tagger_degraded_total").increment(1);
        }
        Ok(outcome)
    }

    /// Tag every item; one output per input, same order, even when degraded.
    /// The first enrichment-service error aborts the whole batch.
    pub async fn tag_batch(
        &self,
        items: Vec<RawItem>,
        fields: &[TextField],
    ) -> Result<TagBatch, PipelineError> {
        let mut batch = TagBatch {
            items: Vec::with_capacity(items.len()),
            degraded: 0,
        };
        for item in items {
            let text = item.compose_text(fields);
            let outcome = self.tag(&text).await?;
            if outcome.is_degraded() {
                batch.degraded += 1;
            }
            batch.items.push(EnrichedItem::new(item, outcome));
        }
        tracing::info!(
            total = batch.items.len(),
            parsed = batch.parsed(),
            degraded = batch.degraded,
            "tag batch finished"
        );
        Ok(batch)
    }
}
