use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{normalize, PredictionSet, SinglePassPredictor};
use crate::augment::{
    validate_augmentations, AugmentationError, AugmentationSpec, Augmenter, Passthrough,
    DEFAULT_AUGMENTATIONS,
};
use crate::catalog::{ClassCatalog, ScoreVector};
use crate::oracle::{ClassifierOracle, ImageRef, OracleError};

/// Lower bound applied to every weighted score before pooling, so a single
/// zero cannot veto a class.
pub const SCORE_FLOOR: f64 = 0.001;

/// Weighted geometric-mean pooling of already weighted passes.
///
/// Computed as the exponential of the mean log score so long pass lists
/// cannot underflow. Returns the normalized fused distribution, or `None`
/// when there is nothing to fuse.
pub fn fuse_geometric(passes: &[ScoreVector]) -> Option<ScoreVector> {
    let first = passes.first()?;
    let count = passes.len() as f64;

    let fused: Vec<f64> = (0..first.len())
        .map(|class| {
            let log_sum: f64 = passes
                .iter()
                .map(|pass| pass.as_slice()[class].max(SCORE_FLOOR).ln())
                .sum();
            (log_sum / count).exp()
        })
        .collect();

    Some(normalize(&ScoreVector::from_catalog_order(fused)))
}

#[derive(Debug, Clone)]
pub struct TtaOutcome {
    pub predictions: PredictionSet,
    pub passes_attempted: usize,
    pub passes_succeeded: usize,
    /// Every pass failed and the result came from a single plain call.
    pub fell_back: bool,
}

/// Runs the oracle once per augmentation and fuses the passes.
#[derive(Clone)]
pub struct TtaAggregator {
    single: SinglePassPredictor,
    oracle: Arc<dyn ClassifierOracle>,
    catalog: Arc<ClassCatalog>,
    augmenter: Arc<dyn Augmenter>,
    augmentations: Vec<AugmentationSpec>,
}

impl TtaAggregator {
    pub fn new(oracle: Arc<dyn ClassifierOracle>, catalog: Arc<ClassCatalog>) -> Self {
        Self {
            single: SinglePassPredictor::new(oracle.clone(), catalog.clone()),
            oracle,
            catalog,
            augmenter: Arc::new(Passthrough),
            augmentations: DEFAULT_AUGMENTATIONS.to_vec(),
        }
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn Augmenter>) -> Self {
        self.augmenter = augmenter;
        self
    }

    pub fn with_augmentations(
        mut self,
        augmentations: Vec<AugmentationSpec>,
    ) -> Result<Self, AugmentationError> {
        validate_augmentations(&augmentations)?;
        self.augmentations = augmentations;
        Ok(self)
    }

    pub fn augmentations(&self) -> &[AugmentationSpec] {
        &self.augmentations
    }

    pub async fn aggregate(&self, image: &ImageRef) -> Result<TtaOutcome, OracleError> {
        let attempted = self.augmentations.len();
        let mut weighted = Vec::with_capacity(attempted);

        // One pass at a time; never more than one oracle call in flight.
        for spec in &self.augmentations {
            match self.run_pass(spec, image).await {
                Ok(scores) => {
                    debug!("TTA pass {} succeeded", spec);
                    weighted.push(scores.scaled(spec.weight));
                }
                Err(e) => warn!("TTA pass {} failed: {}", spec, e),
            }
        }

        let Some(fused) = fuse_geometric(&weighted) else {
            warn!(
                "All {} TTA passes failed for {}, falling back to a single prediction",
                attempted,
                image.uri()
            );
            let predictions = self.single.predict_once(image).await?;
            return Ok(TtaOutcome {
                predictions,
                passes_attempted: attempted,
                passes_succeeded: 0,
                fell_back: true,
            });
        };

        info!("Fused {}/{} TTA passes for {}", weighted.len(), attempted, image.uri());
        Ok(TtaOutcome {
            predictions: PredictionSet::from_distribution(&self.catalog, &fused),
            passes_attempted: attempted,
            passes_succeeded: weighted.len(),
            fell_back: false,
        })
    }

    async fn run_pass(
        &self,
        spec: &AugmentationSpec,
        image: &ImageRef,
    ) -> Result<ScoreVector, OracleError> {
        let view = self.augmenter.apply(spec, image).await?;
        let raw = self.oracle.classify(&view).await?;
        Ok(raw.into_vector(&self.catalog)?)
    }
}
