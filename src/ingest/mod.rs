// src/ingest/mod.rs
pub mod providers;
pub mod retry;
pub mod types;

use crate::error::PipelineError;
use crate::ingest::types::{RawItem, SourceProvider, SourceQuery};
use crate::store::RecordStore;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exported snapshot).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items returned by providers.");
        describe_counter!("ingest_stored_total", "Items upserted into the record store.");
        describe_counter!(
            "ingest_store_failures_total",
            "Items skipped because their write failed."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetches that failed after retries."
        );
        describe_counter!("fetch_retries_total", "Retries issued by the resilient fetcher.");
        describe_counter!(
            "fetch_exhausted_total",
            "Remote calls that ran out of attempts."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
    });
}

/// Normalize markup-bearing text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 4000 chars keeps prompts bounded
    if out.chars().count() > 4000 {
        out = out.chars().take(4000).collect();
    }

    out
}

/// Per-batch outcome of a storage pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
}

/// Upsert every item; a failed write is logged and skipped, never fatal.
pub fn store_batch(store: &dyn RecordStore, items: &[RawItem]) -> IngestReport {
    ensure_metrics_described();

    let mut report = IngestReport {
        fetched: items.len(),
        ..IngestReport::default()
    };
    for item in items {
        match store.upsert(item) {
            Ok(()) => report.stored += 1,
            Err(e) => {
                tracing::warn!(error = %e, id = %item.id, source = %item.source, "skipping item");
                report.skipped += 1;
            }
        }
    }

    counter!("ingest_stored_total").increment(report.stored as u64);
    counter!("ingest_store_failures_total").increment(report.skipped as u64);
    report
}

/// Fetch from one provider and persist the results.
///
/// `RemoteUnavailable` from the provider is propagated; items stored by
/// earlier runs stay valid.
pub async fn run_ingest(
    provider: &dyn SourceProvider,
    query: &SourceQuery,
    store: &dyn RecordStore,
) -> Result<IngestReport, PipelineError> {
    ensure_metrics_described();

    let t0 = std::time::Instant::now();
    let items = match provider.fetch(query).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, provider = provider.name(), "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            return Err(e);
        }
    };
    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("ingest_items_total", "source" => provider.source().as_str()).increment(items.len() as u64);

    let report = store_batch(store, &items);
    tracing::info!(
        target: "ingest",
        provider = provider.name(),
        fetched = report.fetched,
        stored = report.stored,
        skipped = report.skipped,
        "ingest run finished"
    );
    Ok(report)
}
