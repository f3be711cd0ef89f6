use std::sync::Arc;
use tracing::debug;

use super::{normalize, PredictionSet, NORMALIZATION_TOLERANCE};
use crate::catalog::{ClassCatalog, ScoreVector};
use crate::oracle::{ClassifierOracle, ImageRef, OracleError};

/// One oracle call on the unmodified image.
#[derive(Clone)]
pub struct SinglePassPredictor {
    oracle: Arc<dyn ClassifierOracle>,
    catalog: Arc<ClassCatalog>,
}

impl SinglePassPredictor {
    pub fn new(oracle: Arc<dyn ClassifierOracle>, catalog: Arc<ClassCatalog>) -> Self {
        Self { oracle, catalog }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Classify once and return the labeled, sorted distribution.
    ///
    /// Oracle errors are returned untouched; translating them is the facade's job.
    pub async fn predict_once(&self, image: &ImageRef) -> Result<PredictionSet, OracleError> {
        let scores = self.distribution(image).await?;
        Ok(PredictionSet::from_distribution(&self.catalog, &scores))
    }

    /// The unsorted per-class distribution behind [`predict_once`](Self::predict_once).
    pub async fn distribution(&self, image: &ImageRef) -> Result<ScoreVector, OracleError> {
        let raw = self.oracle.classify(image).await?;
        let scores = raw.into_vector(&self.catalog)?;

        let total = scores.sum();
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            debug!("Single pass scores sum to {:.6}, renormalizing", total);
            return Ok(normalize(&scores));
        }
        Ok(scores)
    }
}
