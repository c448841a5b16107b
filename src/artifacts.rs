// src/artifacts.rs
//! File artifacts passed between stages (enriched items, price snapshots).

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;
use crate::sentiment::EnrichedItem;

/// Write via a sibling `.tmp` file and rename, so readers never see a half-written artifact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    {
        let mut f = fs::File::create(tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let s = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&s)?)
}

pub fn save_enriched(path: &Path, items: &[EnrichedItem]) -> Result<(), PipelineError> {
    save_json(path, items)
}

/// Load one enriched artifact. A bare object is accepted as a one-item list.
pub fn load_enriched(path: &Path) -> Result<Vec<EnrichedItem>, PipelineError> {
    let value: serde_json::Value = load_json(path)?;
    let items = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(value)?],
        other => {
            return Err(PipelineError::InvalidTable(format!(
                "{}: expected a JSON array of enriched items, got {}",
                path.display(),
                json_kind(&other)
            )))
        }
    };
    Ok(items)
}

/// Load every existing artifact in `paths`; missing files are logged and skipped.
pub fn load_enriched_many<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<EnrichedItem>, PipelineError> {
    let mut out = Vec::new();
    for p in paths {
        let p = p.as_ref();
        if !p.exists() {
            tracing::warn!(path = %p.display(), "enriched artifact not found, skipping");
            continue;
        }
        let items = load_enriched(p)?;
        tracing::debug!(path = %p.display(), items = items.len(), "enriched artifact loaded");
        out.extend(items);
    }
    Ok(out)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{RawItem, Source};
    use crate::sentiment::{Sentiment, TagOutcome, TagResult};
    use chrono::{TimeZone, Utc};

    fn sample() -> EnrichedItem {
        let mut item = RawItem::new("t3_abc", Source::Reddit, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        item.title = Some("TSLA to the moon".into());
        EnrichedItem::new(
            item,
            TagOutcome::Parsed(TagResult {
                sentiment: Sentiment::Positive,
                tickers: vec!["TSLA".into()],
            }),
        )
    }

    #[test]
    fn enriched_artifact_is_flat_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/reddit_with_sentiment.json");
        save_enriched(&path, &[sample()]).unwrap();

        let raw: serde_json::Value = load_json(&path).unwrap();
        assert_eq!(raw[0]["id"], "t3_abc");
        assert_eq!(raw[0]["sentiment"], "Positive");
        assert_eq!(raw[0]["tickers"][0], "TSLA");
        assert!(!path.with_extension("json.tmp").exists());

        assert_eq!(load_enriched(&path).unwrap(), vec![sample()]);
    }

    #[test]
    fn single_object_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let one = dir.path().join("one.json");
        save_json(&one, &sample()).unwrap();
        let missing = dir.path().join("missing.json");

        let all = load_enriched_many(&[one, missing]).unwrap();
        assert_eq!(all.len(), 1);

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "42").unwrap();
        assert!(matches!(load_enriched(&bad), Err(PipelineError::InvalidTable(_))));
    }
}
