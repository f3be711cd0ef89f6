//! Prediction Service
//!
//! The single entry point the rest of the application calls. It owns the
//! availability state and the one-time initialization, gates every request
//! on connectivity and oracle health, and dispatches to the single-pass or
//! TTA predictor under a bounded timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::augment::{AugmentationError, AugmentationSpec, Augmenter, Passthrough, PixelAugmenter};
use crate::availability::{AvailabilityTracker, HealthSnapshot, ProbeFailure, DEFAULT_PROBE_TIMEOUT};
use crate::catalog::ClassCatalog;
use crate::config::{AgroConfig, BackendKind};
use crate::connectivity::{AlwaysOnline, ConnectivityProbe, TcpReachability};
use crate::error::PredictionError;
use crate::oracle::{ClassifierOracle, ImageRef, OnnxOracle, OracleError, RemoteOracle, SimulatedOracle};
use crate::prediction::{
    pool_mean, PredictionResult, PredictionSet, SinglePassPredictor, TtaAggregator,
};

pub const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PredictionService {
    oracle: Arc<dyn ClassifierOracle>,
    catalog: Arc<ClassCatalog>,
    connectivity: Arc<dyn ConnectivityProbe>,
    tracker: AvailabilityTracker,
    single: SinglePassPredictor,
    tta: TtaAggregator,
    predict_timeout: Duration,
    init: OnceCell<()>,
}

impl PredictionService {
    pub fn new(
        oracle: Arc<dyn ClassifierOracle>,
        catalog: Arc<ClassCatalog>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            tracker: AvailabilityTracker::with_probe_timeout(oracle.clone(), DEFAULT_PROBE_TIMEOUT),
            single: SinglePassPredictor::new(oracle.clone(), catalog.clone()),
            tta: TtaAggregator::new(oracle.clone(), catalog.clone()),
            oracle,
            catalog,
            connectivity,
            predict_timeout: DEFAULT_PREDICT_TIMEOUT,
            init: OnceCell::new(),
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.tracker = AvailabilityTracker::with_probe_timeout(self.oracle.clone(), probe_timeout);
        self
    }

    pub fn with_predict_timeout(mut self, predict_timeout: Duration) -> Self {
        self.predict_timeout = predict_timeout;
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn Augmenter>) -> Self {
        self.tta = self.tta.with_augmenter(augmenter);
        self
    }

    pub fn with_augmentations(
        mut self,
        augmentations: Vec<AugmentationSpec>,
    ) -> Result<Self, AugmentationError> {
        self.tta = self.tta.with_augmentations(augmentations)?;
        Ok(self)
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    /// Run the first health probe exactly once, however many callers race here.
    ///
    /// Returns true when this call ran or waited on that probe.
    async fn ensure_initialized(&self) -> bool {
        let fresh = !self.init.initialized();
        self.init
            .get_or_init(|| async {
                let ready = self.tracker.check_health().await;
                info!(
                    "Prediction service initialized with {} oracle ({} classes, ready: {})",
                    self.oracle.name(),
                    self.catalog.len(),
                    ready
                );
            })
            .await;
        fresh
    }

    /// Connectivity and availability gate shared by every prediction path.
    async fn admit(&self) -> Result<(), PredictionError> {
        if !self.connectivity.is_online().await {
            warn!("Rejecting prediction: device is offline");
            return Err(PredictionError::NoConnectivity);
        }

        let just_probed = self.ensure_initialized().await;
        if !self.tracker.is_available().await {
            // The probe that just ran counts as this request's re-check.
            if just_probed || !self.tracker.check_health().await {
                let snapshot = self.tracker.snapshot().await;
                if snapshot.last_failure == Some(ProbeFailure::Timeout) {
                    warn!("Rejecting prediction: {} did not answer its probe", self.oracle.name());
                    return Err(PredictionError::Timeout {
                        after: self.tracker.probe_timeout(),
                    });
                }
                warn!("Rejecting prediction: {} is unavailable", self.oracle.name());
                return Err(PredictionError::ServiceUnavailable);
            }
        }
        Ok(())
    }

    /// Run `work` under the predict timeout, demoting availability on any failure.
    async fn bounded<T, F>(&self, work: F) -> Result<T, PredictionError>
    where
        F: Future<Output = Result<T, OracleError>>,
    {
        match tokio::time::timeout(self.predict_timeout, work).await {
            Ok(Ok(done)) => Ok(done),
            Ok(Err(e)) => {
                warn!("Prediction failed: {}", e);
                self.tracker.mark_unavailable().await;
                Err(PredictionError::from_oracle(e, self.predict_timeout))
            }
            Err(_) => {
                warn!("Prediction exceeded {:?}", self.predict_timeout);
                self.tracker.mark_unavailable().await;
                Err(PredictionError::Timeout {
                    after: self.predict_timeout,
                })
            }
        }
    }

    /// Classify `image`, fusing augmentations when `use_tta` is set.
    #[instrument(skip(self, image), fields(image = %image.uri(), oracle = %self.oracle.name()))]
    pub async fn predict(
        &self,
        image: &ImageRef,
        use_tta: bool,
    ) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        self.admit().await?;
        let (predictions, used_tta) = self.bounded(self.dispatch(image, use_tta)).await?;
        self.finish(predictions, used_tta, started)
    }

    /// Classify several photos of the same plant and average their distributions.
    #[instrument(skip(self, images), fields(images = images.len()))]
    pub async fn predict_batch(&self, images: &[ImageRef]) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        if images.is_empty() {
            return Err(PredictionError::EmptyBatch);
        }
        self.admit().await?;

        let passes = self
            .bounded(async {
                let mut passes = Vec::with_capacity(images.len());
                for image in images {
                    passes.push(self.single.distribution(image).await?);
                }
                Ok::<_, OracleError>(passes)
            })
            .await?;

        let fused = pool_mean(&passes).ok_or_else(|| {
            PredictionError::Initialization("batch produced no score vectors".to_string())
        })?;
        let predictions = PredictionSet::from_distribution(&self.catalog, &fused);
        self.finish(predictions, true, started)
    }

    fn finish(
        &self,
        predictions: PredictionSet,
        used_tta: bool,
        started: Instant,
    ) -> Result<PredictionResult, PredictionError> {
        let top_prediction = predictions
            .top()
            .cloned()
            .ok_or_else(|| PredictionError::Initialization("class catalog is empty".to_string()))?;
        let processing_time_ms = started.elapsed().as_millis() as u64;

        info!(
            "Predicted {} ({:.1}%) in {}ms, tta={}",
            top_prediction.label,
            top_prediction.confidence * 100.0,
            processing_time_ms,
            used_tta
        );

        Ok(PredictionResult {
            predictions,
            top_prediction,
            processing_time_ms,
            used_tta,
        })
    }

    async fn dispatch(
        &self,
        image: &ImageRef,
        use_tta: bool,
    ) -> Result<(PredictionSet, bool), OracleError> {
        if use_tta {
            let outcome = self.tta.aggregate(image).await?;
            Ok((outcome.predictions, !outcome.fell_back))
        } else {
            Ok((self.single.predict_once(image).await?, false))
        }
    }

    /// Probe the oracle now and report the resulting state.
    pub async fn health(&self) -> HealthSnapshot {
        if !self.ensure_initialized().await {
            self.tracker.check_health().await;
        }
        self.tracker.snapshot().await
    }

    /// Last known state without probing.
    pub async fn last_health(&self) -> HealthSnapshot {
        self.tracker.snapshot().await
    }

    /// Wire up catalog, oracle, connectivity and augmenter from configuration.
    pub async fn from_config(config: &AgroConfig) -> Result<Self, PredictionError> {
        let catalog = match &config.labels_path {
            Some(path) => ClassCatalog::load(path).await.map_err(|e| {
                PredictionError::Initialization(format!("labels {}: {}", path.display(), e))
            })?,
            None => ClassCatalog::default(),
        };
        let catalog = Arc::new(catalog);

        let (oracle, connectivity): (Arc<dyn ClassifierOracle>, Arc<dyn ConnectivityProbe>) =
            match config.backend {
                BackendKind::Remote => {
                    let remote = RemoteOracle::new(&config.api_url, config.predict_timeout())
                        .map_err(|e| PredictionError::Initialization(e.to_string()))?
                        .with_server_tta(config.server_tta)
                        .with_probe_timeout(config.probe_timeout());
                    let reachability = TcpReachability::for_url(&config.api_url, config.probe_timeout())
                        .ok_or_else(|| {
                            PredictionError::Initialization(format!("invalid API URL {}", config.api_url))
                        })?;
                    (Arc::new(remote), Arc::new(reachability))
                }
                BackendKind::Onnx => {
                    let onnx = OnnxOracle::load(
                        &config.model_path,
                        config.input_size,
                        config.pixel_scaling,
                        config.inference_threads,
                    )
                    .map_err(|e| {
                        PredictionError::Initialization(format!(
                            "model {}: {}",
                            config.model_path.display(),
                            e
                        ))
                    })?;
                    (Arc::new(onnx), Arc::new(AlwaysOnline))
                }
                BackendKind::Simulated => {
                    warn!("Using simulated predictions; results are random");
                    (Arc::new(SimulatedOracle::new(catalog.len())), Arc::new(AlwaysOnline))
                }
            };

        let augmenter: Arc<dyn Augmenter> = if config.pixel_augmentation {
            Arc::new(PixelAugmenter)
        } else {
            Arc::new(Passthrough)
        };

        Ok(Self::new(oracle, catalog, connectivity)
            .with_probe_timeout(config.probe_timeout())
            .with_predict_timeout(config.predict_timeout())
            .with_augmenter(augmenter))
    }
}
