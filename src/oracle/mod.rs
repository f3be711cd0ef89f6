//! Classifier Oracles
//!
//! The classifier is an opaque collaborator: give it an image, get back one
//! score per class. Implementations:
//! - [`RemoteOracle`]: HTTP inference endpoint (`/health`, `/predict`)
//! - [`OnnxOracle`]: on-device model through ONNX Runtime
//! - [`SimulatedOracle`]: random scores for running without a model

mod input;
mod onnx;
mod remote;
mod simulated;

pub use input::ImageRef;
pub use onnx::{OnnxOracle, PixelScaling};
pub use remote::{ConnectionReport, RemoteOracle};
pub use simulated::SimulatedOracle;

use async_trait::async_trait;
use thiserror::Error;

use crate::catalog::{CatalogError, ClassCatalog, ScoreVector};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("oracle responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("inference backend error: {0}")]
    Backend(String),
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl OracleError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, OracleError::Timeout)
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout
        } else if err.is_decode() {
            OracleError::InvalidResponse(err.to_string())
        } else {
            OracleError::Transport(err.to_string())
        }
    }
}

impl From<image::ImageError> for OracleError {
    fn from(err: image::ImageError) -> Self {
        OracleError::Image(err.to_string())
    }
}

/// Scores as produced by an oracle, before they are laid onto the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScores {
    /// Positional output vector: entry `i` belongs to class `i`.
    Dense(Vec<f64>),
    /// Explicit `(class index, score)` pairs.
    Indexed(Vec<(usize, f64)>),
}

impl RawScores {
    pub fn into_vector(self, catalog: &ClassCatalog) -> Result<ScoreVector, CatalogError> {
        match self {
            RawScores::Dense(scores) => ScoreVector::from_raw(catalog, &scores),
            RawScores::Indexed(pairs) => ScoreVector::from_indexed(catalog, pairs),
        }
    }
}

/// The classifier contract consumed by the prediction core.
#[async_trait]
pub trait ClassifierOracle: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Readiness probe: `Ok(true)` only when the model is loaded and serving.
    async fn health(&self) -> Result<bool, OracleError>;

    /// Run the classifier once on `image`.
    async fn classify(&self, image: &ImageRef) -> Result<RawScores, OracleError>;
}
