//! On-device classifier backed by ONNX Runtime.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::{ClassifierOracle, ImageRef, OracleError, RawScores};

/// ImageNet channel means in BGR order, as used by Keras' ResNet50 preprocessing.
const IMAGENET_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// How pixels are fed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelScaling {
    /// RGB values in 0..=255, no normalization (the quantized mobile model).
    #[default]
    Raw,
    /// BGR with the ImageNet mean subtracted (Keras `caffe` mode).
    CaffeImagenet,
}

pub struct OnnxOracle {
    session: Arc<Mutex<Session>>,
    model_path: PathBuf,
    input_size: u32,
    scaling: PixelScaling,
}

impl OnnxOracle {
    pub fn load(
        model_path: impl AsRef<Path>,
        input_size: u32,
        scaling: PixelScaling,
        threads: usize,
    ) -> Result<Self, OracleError> {
        let model_path = model_path.as_ref().to_path_buf();
        let session = Session::builder()
            .map_err(backend)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(backend)?
            .with_intra_threads(threads)
            .map_err(backend)?
            .commit_from_file(&model_path)
            .map_err(backend)?;

        info!(
            "Loaded ONNX classifier from {} ({}x{} input, {:?})",
            model_path.display(),
            input_size,
            input_size,
            scaling
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            model_path,
            input_size,
            scaling,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

#[async_trait]
impl ClassifierOracle for OnnxOracle {
    fn name(&self) -> &str {
        "onnx"
    }

    async fn health(&self) -> Result<bool, OracleError> {
        // A session only exists once the model has been committed.
        Ok(true)
    }

    async fn classify(&self, source: &ImageRef) -> Result<RawScores, OracleError> {
        let data = source.read().await?;
        let session = self.session.clone();
        let size = self.input_size;
        let scaling = self.scaling;

        let scores = tokio::task::spawn_blocking(move || -> Result<Vec<f64>, OracleError> {
            let decoded = image::load_from_memory(&data)?;
            let input = preprocess(&decoded, size, scaling);
            let shape = [1usize, size as usize, size as usize, 3];
            let tensor = Tensor::from_array((shape, input)).map_err(backend)?;

            let mut session = session
                .lock()
                .map_err(|_| OracleError::Backend("ONNX session lock poisoned".to_string()))?;
            let outputs = session.run(ort::inputs![tensor]).map_err(backend)?;
            let (_shape, values) = outputs[0].try_extract_tensor::<f32>().map_err(backend)?;

            Ok(values.iter().map(|&v| v as f64).collect())
        })
        .await
        .map_err(|e| OracleError::Backend(format!("inference task failed: {}", e)))??;

        debug!("ONNX produced {} scores for {}", scores.len(), source.uri());
        Ok(RawScores::Dense(scores))
    }
}

/// Resize to a square NHWC float buffer.
///
/// The whole frame is kept: resizing ignores the aspect ratio instead of cropping.
pub(crate) fn preprocess(image: &DynamicImage, size: u32, scaling: PixelScaling) -> Vec<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Lanczos3).to_rgb8();
    let mut buffer = Vec::with_capacity((size * size * 3) as usize);

    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        match scaling {
            PixelScaling::Raw => {
                buffer.extend_from_slice(&[r as f32, g as f32, b as f32]);
            }
            PixelScaling::CaffeImagenet => {
                buffer.extend_from_slice(&[
                    b as f32 - IMAGENET_BGR_MEAN[0],
                    g as f32 - IMAGENET_BGR_MEAN[1],
                    r as f32 - IMAGENET_BGR_MEAN[2],
                ]);
            }
        }
    }

    buffer
}

fn backend(err: impl std::fmt::Display) -> OracleError {
    OracleError::Backend(err.to_string())
}
