//! AgroScan
//!
//! Plant leaf disease prediction core:
//! - Classifier oracles (remote API, ONNX Runtime, simulation)
//! - Single-pass and test-time-augmented prediction with geometric-mean fusion
//! - Oracle availability tracking behind one prediction facade
//! - Scan history, disease catalog and the app lock

pub mod augment;
pub mod availability;
pub mod catalog;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod history;
pub mod oracle;
pub mod prediction;
pub mod security;
pub mod server;
pub mod service;
pub mod telemetry;

// Re-exports for convenience
pub use catalog::{ClassCatalog, DiseaseInfo};
pub use error::{Locale, PredictionError};
pub use oracle::{ClassifierOracle, ImageRef};
pub use prediction::{PredictionEntry, PredictionResult, PredictionSet};
pub use service::PredictionService;
