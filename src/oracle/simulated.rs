use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

use super::{ClassifierOracle, ImageRef, OracleError, RawScores};

/// Stand-in classifier used when no model can be loaded.
///
/// Scores are uniform random numbers; the predictors normalize them.
pub struct SimulatedOracle {
    classes: usize,
    rng: Mutex<StdRng>,
}

impl SimulatedOracle {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(classes: usize, seed: u64) -> Self {
        Self {
            classes,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ClassifierOracle for SimulatedOracle {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn health(&self) -> Result<bool, OracleError> {
        Ok(true)
    }

    async fn classify(&self, image: &ImageRef) -> Result<RawScores, OracleError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| OracleError::Backend("simulation rng lock poisoned".to_string()))?;
        let scores: Vec<f64> = (0..self.classes).map(|_| rng.gen::<f64>()).collect();

        debug!("Simulated {} scores for {}", scores.len(), image.uri());
        Ok(RawScores::Dense(scores))
    }
}
