// tests/providers.rs
use chrono::{TimeZone, Utc};
use ticker_sentiment_pipeline::ingest::providers::{newsapi, reddit, rss, twitter};
use ticker_sentiment_pipeline::ingest::store_batch;
use ticker_sentiment_pipeline::ingest::types::{Source, TextField};
use ticker_sentiment_pipeline::store::{RecordStore, SqliteRecordStore};

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn fetched_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap()
}

#[test]
fn twitter_fixture_maps_to_content_items() {
    let items = twitter::parse_recent_search(&fixture("twitter_recent.json"), fetched_at()).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "1897001");
    assert_eq!(items[0].source, Source::Twitter);
    assert_eq!(items[0].published_at, Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap());
    assert_eq!(
        items[0].compose_text(&[TextField::Content]),
        "$TSLA breaking out after deliveries beat"
    );
    assert_eq!(items[0].raw_payload["lang"], "en");
    // no created_at → fetch time
    assert_eq!(items[1].published_at, fetched_at());
}

#[test]
fn newsapi_fixture_is_cleaned_and_keyed_by_url() {
    let items = newsapi::parse_everything(&fixture("newsapi_everything.json"), fetched_at()).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "https://news.example.test/apple-record");
    assert_eq!(items[0].title.as_deref(), Some("Apple's record quarter"));
    assert_eq!(items[0].description.as_deref(), Some("iPhone sales beat expectations"));
    assert_eq!(items[0].author.as_deref(), Some("Jane Roe"));
    assert_eq!(items[1].published_at, fetched_at());
    assert_eq!(items[1].raw_payload["source"]["name"], "Example Wire");
}

#[test]
fn reddit_fixture_keeps_title_and_body() {
    let items = reddit::parse_search_listing(&fixture("reddit_search.json"), fetched_at()).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].compose_text(&[TextField::Title, TextField::Body]),
        "TSLA puts printing Recall news hit hard"
    );
    assert_eq!(items[0].published_at, Utc.timestamp_opt(1_741_082_400, 0).unwrap());
    assert!(items[1].body.is_none());
    assert_eq!(items[1].compose_text(&[TextField::Title, TextField::Body]), "AAPL long term?");
}

#[test]
fn rss_fixture_strips_markup() {
    let items = rss::parse_feed(&fixture("market_rss.xml"), fetched_at()).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "https://feed.example.test/btc-70k");
    assert_eq!(items[0].title.as_deref(), Some("Bitcoin tops $70k"));
    assert_eq!(items[0].description.as_deref(), Some("Crypto rally continues"));
    assert_eq!(items[0].published_at, Utc.with_ymd_and_hms(2025, 3, 4, 14, 30, 0).unwrap());
}

#[test]
fn parsed_fixtures_store_cleanly() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let mut all = twitter::parse_recent_search(&fixture("twitter_recent.json"), fetched_at()).unwrap();
    all.extend(newsapi::parse_everything(&fixture("newsapi_everything.json"), fetched_at()).unwrap());
    all.extend(reddit::parse_search_listing(&fixture("reddit_search.json"), fetched_at()).unwrap());

    let report = store_batch(&store, &all);
    assert_eq!(report.stored, 6);
    assert_eq!(report.skipped, 0);
    assert_eq!(store.count(Source::Twitter).unwrap(), 2);
    assert_eq!(store.count(Source::News).unwrap(), 2);
    assert_eq!(store.count(Source::Reddit).unwrap(), 2);
}
