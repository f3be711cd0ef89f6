//! Prediction types and the two prediction strategies.
//!
//! - [`SinglePassPredictor`] runs the classifier once on the untouched image.
//! - [`TtaAggregator`] runs it once per augmentation and fuses the passes
//!   with weighted geometric-mean pooling.

mod single;
mod tta;

pub use single::SinglePassPredictor;
pub use tta::{fuse_geometric, TtaAggregator, TtaOutcome, SCORE_FLOOR};

use serde::Serialize;
use std::cmp::Ordering;

use crate::catalog::{ClassCatalog, ClassIndex, ScoreVector};

/// Allowed drift of a single-pass distribution before it is renormalized.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-3;

/// One labeled class score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEntry {
    #[serde(rename = "className")]
    pub label: String,
    #[serde(rename = "classIndex")]
    pub index: ClassIndex,
    pub confidence: f64,
}

/// Entries sorted by descending confidence, one per catalog label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PredictionSet {
    entries: Vec<PredictionEntry>,
}

impl PredictionSet {
    /// Label a distribution with the catalog and sort it. The caller is
    /// responsible for having normalized `scores`.
    pub fn from_distribution(catalog: &ClassCatalog, scores: &ScoreVector) -> Self {
        let mut entries: Vec<PredictionEntry> = catalog
            .indices()
            .map(|index| PredictionEntry {
                label: catalog.label(index).to_string(),
                index,
                confidence: scores.get(index),
            })
            .collect();

        // Stable sort keeps catalog order between equal confidences.
        entries.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        Self { entries }
    }

    pub fn top(&self) -> Option<&PredictionEntry> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[PredictionEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_confidence(&self) -> f64 {
        self.entries.iter().map(|e| e.confidence).sum()
    }

    pub fn confidence_of(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.confidence)
    }
}

/// What the facade hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub predictions: PredictionSet,
    pub top_prediction: PredictionEntry,
    pub processing_time_ms: u64,
    #[serde(rename = "usedTTA")]
    pub used_tta: bool,
}

/// Divide by the total so the vector sums to 1. An all-zero vector becomes uniform.
pub fn normalize(scores: &ScoreVector) -> ScoreVector {
    let total = scores.sum();
    if total > 0.0 && total.is_finite() {
        scores.scaled(1.0 / total)
    } else if scores.is_empty() {
        scores.clone()
    } else {
        let uniform = 1.0 / scores.len() as f64;
        scores.map(|_| uniform)
    }
}

/// Per-class arithmetic mean of several distributions, normalized.
///
/// Pools photos of different leaves; augmented views of one photo go through
/// [`fuse_geometric`] instead.
pub fn pool_mean(distributions: &[ScoreVector]) -> Option<ScoreVector> {
    let first = distributions.first()?;
    let count = distributions.len() as f64;

    let mean: Vec<f64> = (0..first.len())
        .map(|class| {
            distributions
                .iter()
                .map(|d| d.as_slice()[class])
                .sum::<f64>()
                / count
        })
        .collect();

    Some(normalize(&ScoreVector::from_catalog_order(mean)))
}
