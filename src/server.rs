//! Inference Server
//!
//! Serves the prediction service over HTTP with the same contract the remote
//! oracle consumes, so one AgroScan instance can back another.

use axum::{
    extract::{multipart::MultipartError, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::availability::ServiceHealth;
use crate::error::PredictionError;
use crate::oracle::ImageRef;
use crate::prediction::{PredictionEntry, PredictionSet};
use crate::service::PredictionService;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error body: `{"detail": "..."}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        let status = match &err {
            PredictionError::NoConnectivity | PredictionError::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PredictionError::EmptyBatch => StatusCode::BAD_REQUEST,
            _ => {
                error!("Prediction request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = match &err {
            PredictionError::NoConnectivity | PredictionError::ServiceUnavailable => {
                "Model not available".to_string()
            }
            other => format!("Error processing image: {}", other),
        };
        Self { status, detail }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub input_size: u32,
}

#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    message: &'static str,
    model_loaded: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    classes: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    version: &'static str,
    input_size: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    success: bool,
    predictions: PredictionSet,
    top_prediction: PredictionEntry,
    #[serde(rename = "usedTTA")]
    used_tta: bool,
    processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_info: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_images: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictQuery {
    use_tta: Option<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict-batch", post(predict_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "AgroScan API listening on {} ({} oracle)",
        listener.local_addr()?,
        state.service.oracle_name()
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn model_loaded(state: &AppState) -> bool {
    state.service.health().await.state == ServiceHealth::Available
}

async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "online",
        message: "AgroScan API",
        model_loaded: model_loaded(&state).await,
        version: API_VERSION,
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: model_loaded(&state).await,
        classes: state.service.catalog().labels().to_vec(),
    })
}

async fn predict(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut image = None;
    let mut use_tta = query.use_tta.unwrap_or(false);

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or("image.jpg").to_string();
                let data = field.bytes().await?;
                info!("Received {} ({} bytes)", name, data.len());
                image = Some(ImageRef::bytes(name, data.to_vec()));
            }
            Some("use_tta") => {
                let text = field.text().await?;
                use_tta = parse_flag(&text)
                    .ok_or_else(|| ApiError::bad_request(format!("Invalid use_tta value {:?}", text)))?;
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("Missing file field"))?;
    let result = state.service.predict(&image, use_tta).await?;

    Ok(Json(PredictResponse {
        success: true,
        predictions: result.predictions,
        top_prediction: result.top_prediction,
        used_tta: result.used_tta,
        processing_time_ms: result.processing_time_ms,
        model_info: Some(ModelInfo {
            version: API_VERSION,
            input_size: state.input_size,
        }),
        num_images: None,
    }))
}

async fn predict_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if matches!(field.name(), Some("file") | Some("files")) {
            let name = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("image_{}.jpg", images.len()));
            let data = field.bytes().await?;
            images.push(ImageRef::bytes(name, data.to_vec()));
        }
    }

    if images.is_empty() {
        return Err(ApiError::bad_request("Missing file field"));
    }

    let count = images.len();
    let result = state.service.predict_batch(&images).await?;

    Ok(Json(PredictResponse {
        success: true,
        predictions: result.predictions,
        top_prediction: result.top_prediction,
        used_tta: result.used_tta,
        processing_time_ms: result.processing_time_ms,
        model_info: None,
        num_images: Some(count),
    }))
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
