// src/label.rs
//! Training-table preparation.
//!
//! A ground-truth `label` column always wins. Without one, a weak label is
//! derived from `avg_sentiment` using two configurable cut points. The weak
//! label is a fallback heuristic and is never reported as ground truth.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifacts::write_atomic;
use crate::error::PipelineError;
use crate::features::{FeatureRow, FeatureTable};

/// Trading class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Sell,
    Hold,
    Buy,
}

impl Label {
    /// Sell=0, Hold=1, Buy=2; the class index a classifier trains on.
    pub fn class_index(self) -> u8 {
        match self {
            Label::Sell => 0,
            Label::Hold => 1,
            Label::Buy => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Sell => "SELL",
            Label::Hold => "HOLD",
            Label::Buy => "BUY",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = PipelineError;

    /// Accepts names in any case or the class index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sell" | "0" => Ok(Label::Sell),
            "hold" | "1" => Ok(Label::Hold),
            "buy" | "2" => Ok(Label::Buy),
            other => Err(PipelineError::InvalidTable(format!("unknown label '{other}'"))),
        }
    }
}

fn default_low() -> f64 {
    0.75
}
fn default_high() -> f64 {
    1.25
}

/// `avg_sentiment < low` → Sell, `> high` → Buy, otherwise Hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelThresholds {
    #[serde(default = "default_low")]
    pub low: f64,
    #[serde(default = "default_high")]
    pub high: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            low: default_low(),
            high: default_high(),
        }
    }
}

impl LabelThresholds {
    /// Clamp into the encoded range [0, 2] and order the pair.
    pub fn sanitized(self) -> Self {
        let fix = |v: f64, d: f64| if v.is_finite() { v.clamp(0.0, 2.0) } else { d };
        let mut low = fix(self.low, default_low());
        let mut high = fix(self.high, default_high());
        if low > high {
            tracing::warn!(low, high, "label thresholds out of order, swapping");
            std::mem::swap(&mut low, &mut high);
        }
        Self { low, high }
    }
}

pub fn weak_label(avg_sentiment: f64, t: &LabelThresholds) -> Label {
    if avg_sentiment < t.low {
        Label::Sell
    } else if avg_sentiment > t.high {
        Label::Buy
    } else {
        Label::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    GroundTruth,
    WeakSentiment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub features: FeatureRow,
    pub label: Label,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTable {
    pub rows: Vec<TrainingRow>,
    pub label_source: LabelSource,
}

/// Attach labels: keep the file's own column when present, derive weak labels otherwise.
pub fn prepare_training_table(
    table: FeatureTable,
    thresholds: &LabelThresholds,
) -> Result<TrainingTable, PipelineError> {
    let FeatureTable { rows, labels } = table;
    let (labels, label_source) = match labels {
        Some(raw) => {
            let parsed = raw
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    s.parse::<Label>().map_err(|e| {
                        PipelineError::InvalidTable(format!("row {}: {e}", i + 1))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            (parsed, LabelSource::GroundTruth)
        }
        None => {
            let t = thresholds.sanitized();
            (
                rows.iter().map(|r| weak_label(r.avg_sentiment, &t)).collect(),
                LabelSource::WeakSentiment,
            )
        }
    };

    tracing::info!(rows = rows.len(), source = ?label_source, "training labels attached");
    Ok(TrainingTable {
        rows: rows
            .into_iter()
            .zip(labels)
            .map(|(features, label)| TrainingRow { features, label })
            .collect(),
        label_source,
    })
}

pub fn write_training_table(path: &Path, table: &TrainingTable) -> Result<(), PipelineError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["ticker", "price", "timestamp", "avg_sentiment", "label"])?;
    for r in &table.rows {
        let f = &r.features;
        wtr.write_record([
            f.ticker.clone(),
            f.price.to_string(),
            f.timestamp.clone(),
            f.avg_sentiment.to_string(),
            r.label.to_string(),
        ])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))?;
    write_atomic(path, &bytes)
}
