// src/telemetry.rs
use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::artifacts::write_atomic;

pub const DEFAULT_LOG_FILTER: &str = "ticker_sentiment_pipeline=info,warn";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Calling it twice is a no-op.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Install the Prometheus recorder. Returns the handle used to render snapshots.
pub fn install_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")
}

/// Write the current metrics in text exposition format (node-exporter textfile style).
pub fn write_metrics_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    write_atomic(path, handle.render().as_bytes())
        .with_context(|| format!("writing metrics snapshot to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_renders_recorded_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("tagger_degraded_total").increment(2);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics/pipeline.prom");
        write_metrics_snapshot(&handle, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("tagger_degraded_total 2"));
    }
}
