// tests/ingest_store.rs
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use ticker_sentiment_pipeline::error::PipelineError;
use ticker_sentiment_pipeline::ingest::run_ingest;
use ticker_sentiment_pipeline::ingest::types::{RawItem, Source, SourceProvider, SourceQuery};
use ticker_sentiment_pipeline::store::{RecordStore, SqliteRecordStore};

struct FixedProvider {
    items: Vec<RawItem>,
}

#[async_trait]
impl SourceProvider for FixedProvider {
    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        Ok(self.items.clone())
    }
    fn source(&self) -> Source {
        Source::Reddit
    }
    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct DownProvider;

#[async_trait]
impl SourceProvider for DownProvider {
    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<RawItem>, PipelineError> {
        Err(PipelineError::RemoteUnavailable {
            service: "reddit".into(),
            attempts: 6,
            status: Some(503),
            detail: "upstream down".into(),
        })
    }
    fn source(&self) -> Source {
        Source::Reddit
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

fn post(id: &str, title: &str) -> RawItem {
    let mut item = RawItem::new(id, Source::Reddit, Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap());
    item.title = Some(title.into());
    item.author = Some("trader42".into());
    item.raw_payload = json!({ "id": id, "title": title, "score": 17 });
    item
}

#[tokio::test]
async fn one_bad_item_does_not_block_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteRecordStore::open(dir.path().join("db/ingest.db")).unwrap();
    let provider = FixedProvider {
        items: vec![post("t3_a", "TSLA earnings"), post("", "no id"), post("t3_b", "AAPL event")],
    };

    let report = run_ingest(&provider, &SourceQuery::default(), &store).await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.stored, 2);
    assert_eq!(report.skipped, 1);
    assert!(store.exists(Source::Reddit, "t3_b").unwrap());
    assert!(!store.exists(Source::News, "t3_b").unwrap());
}

#[tokio::test]
async fn reingestion_is_idempotent_and_lossless() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ingest.db");
    let provider = FixedProvider {
        items: vec![post("t3_a", "TSLA earnings")],
    };
    {
        let store = SqliteRecordStore::open(&path).unwrap();
        run_ingest(&provider, &SourceQuery::default(), &store).await.unwrap();
        run_ingest(&provider, &SourceQuery::default(), &store).await.unwrap();
    }

    // Reopen to check durability.
    let store = SqliteRecordStore::open(&path).unwrap();
    assert_eq!(store.count(Source::Reddit).unwrap(), 1);
    let loaded = store.load(Source::Reddit).unwrap();
    assert_eq!(loaded, provider.items);
    assert_eq!(loaded[0].raw_payload["score"], 17);
}

#[tokio::test]
async fn remote_failure_propagates_and_keeps_stored_rows() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let ok = FixedProvider {
        items: vec![post("t3_a", "BTC rally")],
    };
    run_ingest(&ok, &SourceQuery::default(), &store).await.unwrap();

    let err = run_ingest(&DownProvider, &SourceQuery::default(), &store)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RemoteUnavailable { .. }));
    assert_eq!(store.count(Source::Reddit).unwrap(), 1);
}
