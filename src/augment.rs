//! Test-time augmentations
//!
//! An [`AugmentationSpec`] names a view of the source image and how much the
//! fused result should trust it. Producing the view is delegated to an
//! [`Augmenter`], so the aggregation never depends on how (or whether) pixels
//! are actually transformed.

use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use crate::oracle::{ImageRef, OracleError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Transform {
    Identity,
    FlipHorizontal,
    /// Keep the centered `fraction` of each side.
    CenterCrop { fraction: f32 },
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Identity => "identity",
            Transform::FlipHorizontal => "flip_horizontal",
            Transform::CenterCrop { .. } => "center_crop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSpec {
    pub transform: Transform,
    pub weight: f64,
}

impl AugmentationSpec {
    pub const fn new(transform: Transform, weight: f64) -> Self {
        Self { transform, weight }
    }

    pub fn name(&self) -> &'static str {
        self.transform.name()
    }

    pub fn is_valid(&self) -> bool {
        let transform_ok = match self.transform {
            Transform::CenterCrop { fraction } => fraction > 0.0 && fraction <= 1.0,
            _ => true,
        };
        transform_ok && self.weight.is_finite() && self.weight > 0.0
    }
}

impl fmt::Display for AugmentationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (w={})", self.name(), self.weight)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AugmentationError {
    #[error("at least one augmentation is required")]
    Empty,
    #[error("augmentation {0} needs a finite positive weight and a crop fraction in (0, 1]")]
    Invalid(String),
}

/// Check a custom augmentation list before handing it to the aggregator.
pub fn validate_augmentations(specs: &[AugmentationSpec]) -> Result<(), AugmentationError> {
    if specs.is_empty() {
        return Err(AugmentationError::Empty);
    }
    match specs.iter().find(|s| !s.is_valid()) {
        Some(bad) => Err(AugmentationError::Invalid(bad.to_string())),
        None => Ok(()),
    }
}

/// Default TTA views: the photo as taken, its mirror image and a center crop weighted slightly lower.
pub const DEFAULT_AUGMENTATIONS: [AugmentationSpec; 3] = [
    AugmentationSpec::new(Transform::Identity, 1.0),
    AugmentationSpec::new(Transform::FlipHorizontal, 1.0),
    AugmentationSpec::new(Transform::CenterCrop { fraction: 0.875 }, 0.95),
];

/// Produces the image view for one augmentation pass.
#[async_trait]
pub trait Augmenter: Send + Sync {
    async fn apply(&self, spec: &AugmentationSpec, image: &ImageRef) -> Result<ImageRef, OracleError>;
}

/// Hands every pass the untouched source image.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl Augmenter for Passthrough {
    async fn apply(&self, _spec: &AugmentationSpec, image: &ImageRef) -> Result<ImageRef, OracleError> {
        Ok(image.clone())
    }
}

/// Decodes the image and applies the transform to its pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelAugmenter;

#[async_trait]
impl Augmenter for PixelAugmenter {
    async fn apply(&self, spec: &AugmentationSpec, source: &ImageRef) -> Result<ImageRef, OracleError> {
        if spec.transform == Transform::Identity {
            return Ok(source.clone());
        }

        let data = source.read().await?;
        let transform = spec.transform;
        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, OracleError> {
            let decoded = image::load_from_memory(&data)?;
            let view = match transform {
                Transform::Identity => decoded,
                Transform::FlipHorizontal => decoded.fliph(),
                Transform::CenterCrop { fraction } => {
                    let (w, h) = (decoded.width(), decoded.height());
                    let crop_w = ((w as f32 * fraction).round() as u32).clamp(1, w);
                    let crop_h = ((h as f32 * fraction).round() as u32).clamp(1, h);
                    decoded.crop_imm((w - crop_w) / 2, (h - crop_h) / 2, crop_w, crop_h)
                }
            };

            let mut buffer = Vec::new();
            view.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            Ok(buffer)
        })
        .await
        .map_err(|e| OracleError::Image(format!("augmentation task failed: {}", e)))??;

        let stem = source.file_name();
        let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem.as_str());
        Ok(ImageRef::bytes(format!("{}_{}.png", stem, spec.name()), encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(img: RgbImage) -> ImageRef {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        ImageRef::bytes("leaf.png", buffer)
    }

    async fn decode(image: &ImageRef) -> RgbImage {
        let data = image.read().await.unwrap();
        image::load_from_memory(&data).unwrap().to_rgb8()
    }

    #[test]
    fn test_default_augmentations_are_valid() {
        assert!(DEFAULT_AUGMENTATIONS.iter().all(AugmentationSpec::is_valid));
        let weights: Vec<f64> = DEFAULT_AUGMENTATIONS.iter().map(|a| a.weight).collect();
        assert_eq!(weights, vec![1.0, 1.0, 0.95]);
        assert!(!AugmentationSpec::new(Transform::Identity, 0.0).is_valid());
        assert!(!AugmentationSpec::new(Transform::CenterCrop { fraction: 1.5 }, 1.0).is_valid());
    }

    #[test]
    fn test_validate_augmentations() {
        assert_eq!(validate_augmentations(&[]), Err(AugmentationError::Empty));
        assert!(validate_augmentations(&DEFAULT_AUGMENTATIONS).is_ok());
        let bad = [AugmentationSpec::new(Transform::FlipHorizontal, -1.0)];
        assert!(matches!(
            validate_augmentations(&bad),
            Err(AugmentationError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_passthrough_returns_source() {
        let image = ImageRef::file("/tmp/leaf.jpg");
        let view = Passthrough.apply(&DEFAULT_AUGMENTATIONS[1], &image).await.unwrap();
        assert_eq!(view, image);
    }

    #[tokio::test]
    async fn test_pixel_flip_mirrors_columns() {
        let mut img = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let source = png(img);

        let flipped = PixelAugmenter
            .apply(&DEFAULT_AUGMENTATIONS[1], &source)
            .await
            .unwrap();
        let pixels = decode(&flipped).await;
        assert_eq!(pixels.get_pixel(3, 0), &Rgb([255, 0, 0]));
        assert_eq!(pixels.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(flipped.file_name(), "leaf_flip_horizontal.png");
    }

    #[tokio::test]
    async fn test_pixel_center_crop_shrinks() {
        let source = png(RgbImage::from_pixel(100, 50, Rgb([10, 20, 30])));
        let spec = AugmentationSpec::new(Transform::CenterCrop { fraction: 0.5 }, 0.95);
        let cropped = decode(&PixelAugmenter.apply(&spec, &source).await.unwrap()).await;
        assert_eq!(cropped.dimensions(), (50, 25));
    }
}
