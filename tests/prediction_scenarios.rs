use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use agroscan::augment::{AugmentationSpec, Transform};
use agroscan::connectivity::{AlwaysOnline, StaticConnectivity};
use agroscan::oracle::{ClassifierOracle, ImageRef, OracleError, RawScores};
use agroscan::{ClassCatalog, PredictionError, PredictionService};

/// Oracle that replays queued health answers and score vectors.
struct ReplayOracle {
    health: Mutex<VecDeque<bool>>,
    scores: Mutex<VecDeque<Result<Vec<f64>, OracleError>>>,
    probes: AtomicUsize,
    calls: AtomicUsize,
}

impl ReplayOracle {
    fn new(health: Vec<bool>, scores: Vec<Result<Vec<f64>, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            health: Mutex::new(VecDeque::from(health)),
            scores: Mutex::new(VecDeque::from(scores)),
            probes: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClassifierOracle for ReplayOracle {
    fn name(&self) -> &str {
        "replay"
    }

    async fn health(&self) -> Result<bool, OracleError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self.health.lock().await.pop_front().unwrap_or(true))
    }

    async fn classify(&self, _image: &ImageRef) -> Result<RawScores, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scores
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Transport("no more scores".into())))
            .map(RawScores::Dense)
    }
}

fn leaf() -> ImageRef {
    ImageRef::file("field/leaf_001.jpg")
}

fn online_service(oracle: Arc<ReplayOracle>) -> PredictionService {
    PredictionService::new(oracle, Arc::new(ClassCatalog::default()), Arc::new(AlwaysOnline))
}

#[tokio::test]
async fn test_tta_scenario_prefers_healthy() {
    let oracle = ReplayOracle::new(
        vec![true],
        vec![
            Ok(vec![0.9, 0.05, 0.02, 0.02, 0.01]),
            Ok(vec![0.8, 0.1, 0.05, 0.03, 0.02]),
            Ok(vec![0.85, 0.07, 0.03, 0.03, 0.02]),
        ],
    );
    let service = online_service(oracle.clone());

    let result = service.predict(&leaf(), true).await.unwrap();

    assert!(result.used_tta);
    assert_eq!(result.top_prediction.label, "Healthy");
    assert!(result.top_prediction.confidence > 0.8);
    assert_eq!(result.predictions.len(), 5);
    assert!((result.predictions.total_confidence() - 1.0).abs() < 1e-6);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_offline_rejects_without_oracle_calls() {
    let oracle = ReplayOracle::new(vec![], vec![Ok(vec![1.0])]);
    let service = PredictionService::new(
        oracle.clone(),
        Arc::new(ClassCatalog::default()),
        Arc::new(StaticConnectivity::new(false)),
    );

    for use_tta in [false, true] {
        let err = service.predict(&leaf(), use_tta).await.unwrap_err();
        assert!(matches!(err, PredictionError::NoConnectivity));
    }
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_unavailable_request_reprobes_exactly_once() {
    let oracle = ReplayOracle::new(vec![false, false], vec![]);
    let service = online_service(oracle.clone());

    assert!(matches!(
        service.predict(&leaf(), false).await,
        Err(PredictionError::ServiceUnavailable)
    ));
    let after_first = oracle.probes.load(Ordering::SeqCst);

    assert!(matches!(
        service.predict(&leaf(), false).await,
        Err(PredictionError::ServiceUnavailable)
    ));
    assert_eq!(oracle.probes.load(Ordering::SeqCst), after_first + 1);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_partial_tta_failure_still_fuses() {
    let oracle = ReplayOracle::new(
        vec![true],
        vec![
            Err(OracleError::Timeout),
            Ok(vec![0.05, 0.05, 0.1, 0.75, 0.05]),
            Err(OracleError::Status {
                status: 502,
                body: "bad gateway".into(),
            }),
        ],
    );
    let service = online_service(oracle);

    let result = service.predict(&leaf(), true).await.unwrap();
    assert!(result.used_tta);
    assert_eq!(result.top_prediction.label, "Rust");
}

#[tokio::test]
async fn test_total_tta_failure_falls_back_to_single_pass() {
    let oracle = ReplayOracle::new(
        vec![true],
        vec![
            Err(OracleError::Timeout),
            Err(OracleError::Timeout),
            Err(OracleError::Timeout),
            Ok(vec![0.1, 0.1, 0.1, 0.1, 0.6]),
        ],
    );
    let service = online_service(oracle.clone());

    let result = service.predict(&leaf(), true).await.unwrap();
    assert!(!result.used_tta);
    assert_eq!(result.top_prediction.label, "Yellow");
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_custom_augmentations_drive_pass_count() {
    let oracle = ReplayOracle::new(
        vec![true],
        vec![Ok(vec![0.2, 0.6, 0.1, 0.05, 0.05]), Ok(vec![0.3, 0.5, 0.1, 0.05, 0.05])],
    );
    let service = online_service(oracle.clone())
        .with_augmentations(vec![
            AugmentationSpec::new(Transform::Identity, 1.0),
            AugmentationSpec::new(Transform::FlipHorizontal, 0.9),
        ])
        .unwrap();

    let result = service.predict(&leaf(), true).await.unwrap();
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.top_prediction.label, "Mosaic");

    assert!(online_service(ReplayOracle::new(vec![], vec![]))
        .with_augmentations(vec![])
        .is_err());
}

#[tokio::test]
async fn test_batch_averages_photos() {
    let oracle = ReplayOracle::new(
        vec![true],
        vec![
            Ok(vec![0.8, 0.0, 0.0, 0.2, 0.0]),
            Ok(vec![0.0, 0.0, 0.0, 0.6, 0.4]),
        ],
    );
    let service = online_service(oracle.clone());
    let photos = vec![leaf(), ImageRef::file("field/leaf_002.jpg")];

    let result = service.predict_batch(&photos).await.unwrap();

    assert!(result.used_tta);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert!((result.predictions.confidence_of("Healthy").unwrap() - 0.4).abs() < 1e-12);
    assert!((result.predictions.confidence_of("Rust").unwrap() - 0.4).abs() < 1e-12);
    assert!((result.predictions.confidence_of("Yellow").unwrap() - 0.2).abs() < 1e-12);
    assert_eq!(result.predictions.confidence_of("Mosaic"), Some(0.0));
}
