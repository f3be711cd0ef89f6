//! Remote Classifier
//!
//! Talks to the hosted inference API: `GET /health` for readiness and a
//! multipart `POST /predict` carrying the image bytes and a `use_tta` field.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ClassifierOracle, ImageRef, OracleError, RawScores};
use crate::availability::DEFAULT_PROBE_TIMEOUT;

const HEALTH_PATH: &str = "/health";
const PREDICT_PATH: &str = "/predict";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    model_loaded: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    class_index: usize,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    #[serde(default = "default_success")]
    success: bool,
    predictions: Vec<WireEntry>,
    #[serde(default, rename = "usedTTA")]
    used_tta: Option<bool>,
}

fn default_success() -> bool {
    true
}

/// Outcome of a diagnostic round-trip to `/health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub reachable: bool,
    pub latency_ms: u64,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// HTTP client for the hosted classifier.
pub struct RemoteOracle {
    client: Client,
    base_url: String,
    /// Ask the server to run its own augmentation on every call.
    server_tta: bool,
    /// Upper bound for the `test_connection` round-trip.
    probe_timeout: Duration,
}

impl RemoteOracle {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: trim_base_url(&base_url.into()),
            server_tta: false,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    pub fn with_server_tta(mut self, enabled: bool) -> Self {
        self.server_tta = enabled;
        self
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `use_tta` travels only inside the multipart form.
    fn predict_request(&self, form: Form) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(PREDICT_PATH))
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
    }

    /// Probe `/health` and report reachability and latency instead of a bare flag.
    ///
    /// The whole round-trip is bounded by the probe timeout, not the request timeout.
    pub async fn test_connection(&self) -> ConnectionReport {
        let started = Instant::now();
        let result = tokio::time::timeout(self.probe_timeout, self.fetch_health()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (reachable, model_loaded, error) = match result {
            Ok(Ok((status, model_loaded))) if status.is_success() => (true, model_loaded, None),
            Ok(Ok((status, _))) => (true, false, Some(format!("HTTP {}", status.as_u16()))),
            Ok(Err(e)) => (false, false, Some(e.to_string())),
            Err(_) => (
                false,
                false,
                Some(format!("no answer within {:?}", self.probe_timeout)),
            ),
        };

        ConnectionReport {
            reachable,
            latency_ms,
            model_loaded,
            error,
        }
    }

    async fn fetch_health(&self) -> Result<(reqwest::StatusCode, bool), reqwest::Error> {
        let response = self.client.get(self.url(HEALTH_PATH)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok((status, false));
        }
        let model_loaded = response
            .json::<HealthResponse>()
            .await
            .map(|h| h.model_loaded)
            .unwrap_or(false);
        Ok((status, model_loaded))
    }
}

#[async_trait]
impl ClassifierOracle for RemoteOracle {
    fn name(&self) -> &str {
        "remote"
    }

    async fn health(&self) -> Result<bool, OracleError> {
        let response = self.client.get(self.url(HEALTH_PATH)).send().await?;

        if !response.status().is_success() {
            warn!("Health endpoint answered HTTP {}", response.status());
            return Ok(false);
        }

        let health: HealthResponse = response.json().await?;
        debug!("Remote health: model_loaded={}", health.model_loaded);
        Ok(health.model_loaded)
    }

    async fn classify(&self, image: &ImageRef) -> Result<RawScores, OracleError> {
        let data = image.read().await?;
        let part = Part::bytes(data.to_vec())
            .file_name(image.file_name())
            .mime_str(image.mime_type())
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("use_tta", self.server_tta.to_string());

        debug!("Uploading {} to {}", image.uri(), self.url(PREDICT_PATH));

        let response = self.predict_request(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: PredictResponse = response.json().await?;
        parse_predictions(payload)
    }
}

fn parse_predictions(payload: PredictResponse) -> Result<RawScores, OracleError> {
    if !payload.success {
        return Err(OracleError::InvalidResponse(
            "server reported success=false".to_string(),
        ));
    }
    if payload.predictions.is_empty() {
        return Err(OracleError::InvalidResponse(
            "response carried no predictions".to_string(),
        ));
    }
    if let Some(used_tta) = payload.used_tta {
        debug!("Server echoed usedTTA={}", used_tta);
    }

    Ok(RawScores::Indexed(
        payload
            .predictions
            .into_iter()
            .map(|p| (p.class_index, p.confidence))
            .collect(),
    ))
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
