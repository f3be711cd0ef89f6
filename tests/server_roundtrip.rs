use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use std::time::Duration;

use agroscan::connectivity::AlwaysOnline;
use agroscan::oracle::{ClassifierOracle, ImageRef, RawScores, RemoteOracle, SimulatedOracle};
use agroscan::server::{router, AppState};
use agroscan::{ClassCatalog, PredictionService};

/// Serve a simulated classifier on an ephemeral port and return its base URL.
async fn spawn_server() -> String {
    let service = PredictionService::new(
        Arc::new(SimulatedOracle::seeded(5, 42)),
        Arc::new(ClassCatalog::default()),
        Arc::new(AlwaysOnline),
    );
    let state = AppState {
        service: Arc::new(service),
        input_size: 224,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_remote_oracle_against_local_server() {
    let base = spawn_server().await;
    let oracle = RemoteOracle::new(&base, Duration::from_secs(5)).unwrap();

    assert!(oracle.health().await.unwrap());

    let report = oracle.test_connection().await;
    assert!(report.reachable);
    assert!(report.model_loaded);
    assert!(report.error.is_none());

    let image = ImageRef::bytes("leaf.jpg", vec![0xFF, 0xD8, 0xFF]);
    match oracle.classify(&image).await.unwrap() {
        RawScores::Indexed(pairs) => {
            assert_eq!(pairs.len(), 5);
            let total: f64 = pairs.iter().map(|(_, c)| c).sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
        other => panic!("expected indexed scores, got {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_backed_service_end_to_end() {
    let base = spawn_server().await;
    let remote = RemoteOracle::new(&base, Duration::from_secs(5)).unwrap();
    let service = PredictionService::new(
        Arc::new(remote),
        Arc::new(ClassCatalog::default()),
        Arc::new(AlwaysOnline),
    );

    let image = ImageRef::bytes("leaf.png", vec![1, 2, 3]);
    let result = service.predict(&image, true).await.unwrap();
    assert!(result.used_tta);
    assert!((result.predictions.total_confidence() - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_root_and_health_payloads() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let root: serde_json::Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(root["status"], "online");
    assert_eq!(root["model_loaded"], true);

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["classes"][0], "Healthy");
    assert_eq!(health["classes"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_predict_without_file_is_bad_request() {
    let base = spawn_server().await;
    let form = Form::new().text("use_tta", "true");
    let response = reqwest::Client::new()
        .post(format!("{}/predict", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_predict_batch_fuses_uploads() {
    let base = spawn_server().await;
    let form = Form::new()
        .part("files", Part::bytes(vec![1u8, 2, 3]).file_name("a.jpg"))
        .part("files", Part::bytes(vec![4u8, 5, 6]).file_name("b.jpg"))
        .part("files", Part::bytes(vec![7u8, 8, 9]).file_name("c.jpg"));

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/predict-batch", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["usedTTA"], true);
    assert_eq!(body["numImages"], 3);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 5);
}
