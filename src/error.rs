//! Error taxonomy shared by every pipeline stage.
//!
//! Remote and stage-level failures are surfaced to the caller; per-item
//! failures (`StorageWriteFailed`, `EnrichmentParseFailure`) are logged and
//! absorbed by the batch that produced them.

use thiserror::Error;

use crate::ingest::types::Source;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{service} unavailable after {attempts} attempt(s) (last status: {}): {detail}", status_label(.status))]
    RemoteUnavailable {
        service: String,
        attempts: u32,
        status: Option<u16>,
        detail: String,
    },

    #[error("failed to store {kind} item '{id}': {reason}")]
    StorageWriteFailed {
        kind: Source,
        id: String,
        reason: String,
    },

    #[error("enrichment response could not be parsed: {0}")]
    EnrichmentParseFailure(String),

    #[error("no sentiment data: {0}")]
    NoSentimentData(String),

    #[error("missing price data: {0}")]
    MissingPriceData(String),

    #[error("unexpected payload from {service}: {detail}")]
    Decode { service: String, detail: String },

    #[error("invalid feature table: {0}")]
    InvalidTable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Stage-level hard stops that abort a run instead of producing an empty table.
    pub fn is_hard_stop(&self) -> bool {
        matches!(
            self,
            PipelineError::NoSentimentData(_) | PipelineError::MissingPriceData(_)
        )
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_unavailable_names_service_and_status() {
        let e = PipelineError::RemoteUnavailable {
            service: "twitter".into(),
            attempts: 6,
            status: Some(429),
            detail: "Too Many Requests".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("twitter"));
        assert!(msg.contains("6 attempt"));
        assert!(msg.contains("429"));

        let net = PipelineError::RemoteUnavailable {
            service: "newsapi".into(),
            attempts: 2,
            status: None,
            detail: "connection refused".into(),
        };
        assert!(net.to_string().contains("last status: none"));
    }

    #[test]
    fn only_missing_inputs_are_hard_stops() {
        assert!(PipelineError::MissingPriceData("x".into()).is_hard_stop());
        assert!(PipelineError::NoSentimentData("x".into()).is_hard_stop());
        assert!(!PipelineError::Config("x".into()).is_hard_stop());
    }
}
