//! Class Catalog
//!
//! The fixed, ordered list of disease/health labels the classifier can emit.
//! Position `i` in an oracle score vector always refers to `catalog[i]`.

mod disease;

pub use disease::{DiseaseInfo, Severity};

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Labels of the corn leaf model, in output order.
pub const DEFAULT_LABELS: [&str; 5] = ["Healthy", "Mosaic", "RedRot", "Rust", "Yellow"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("class catalog is empty")]
    Empty,
    #[error("class index key '{0}' is not a non-negative integer")]
    InvalidKey(String),
    #[error("class indices must be dense: missing index {0}")]
    MissingIndex(usize),
    #[error("label '{0}' appears more than once")]
    DuplicateLabel(String),
    #[error("label at index {0} is blank")]
    BlankLabel(usize),
    #[error("score vector has {got} entries but the catalog only has {expected} classes")]
    TooManyScores { got: usize, expected: usize },
    #[error("class index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("failed to read class catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse class catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Validated position inside a [`ClassCatalog`].
///
/// Only the catalog hands these out, so holding one means the index is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ClassIndex(usize);

impl ClassIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// Immutable, ordered index-to-label mapping loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    pub fn new<I, S>(labels: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(CatalogError::BlankLabel(i));
            }
            if labels[..i].contains(label) {
                return Err(CatalogError::DuplicateLabel(label.clone()));
            }
        }

        Ok(Self { labels })
    }

    /// Parse the `{"0": "Healthy", "1": "Mosaic", ...}` mapping shipped with the model.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;

        let mut by_index = BTreeMap::new();
        for (key, label) in raw {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| CatalogError::InvalidKey(key.clone()))?;
            by_index.insert(index, label);
        }

        let mut labels = Vec::with_capacity(by_index.len());
        for (expected, (index, label)) in by_index.into_iter().enumerate() {
            if index != expected {
                return Err(CatalogError::MissingIndex(expected));
            }
            labels.push(label);
        }

        Self::new(labels)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index(&self, raw: usize) -> Result<ClassIndex, CatalogError> {
        if raw < self.labels.len() {
            Ok(ClassIndex(raw))
        } else {
            Err(CatalogError::IndexOutOfRange(raw))
        }
    }

    pub fn label(&self, index: ClassIndex) -> &str {
        &self.labels[index.0]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn indices(&self) -> impl Iterator<Item = ClassIndex> {
        (0..self.labels.len()).map(ClassIndex)
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Per-class scores, exactly one per catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector {
    scores: Vec<f64>,
}

impl ScoreVector {
    /// Map a raw oracle output positionally onto the catalog.
    ///
    /// Missing trailing classes and unusable values (NaN, negative) read as 0.
    /// Extra entries would address labels that do not exist and are rejected.
    pub fn from_raw(catalog: &ClassCatalog, raw: &[f64]) -> Result<Self, CatalogError> {
        if raw.len() > catalog.len() {
            return Err(CatalogError::TooManyScores {
                got: raw.len(),
                expected: catalog.len(),
            });
        }

        let mut scores = vec![0.0; catalog.len()];
        for (slot, value) in scores.iter_mut().zip(raw) {
            *slot = sanitize(*value);
        }
        Ok(Self { scores })
    }

    /// Build from `(index, score)` pairs such as a remote `{classIndex, confidence}` list.
    pub fn from_indexed<I>(catalog: &ClassCatalog, pairs: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let mut scores = vec![0.0; catalog.len()];
        for (raw_index, value) in pairs {
            let index = catalog.index(raw_index)?;
            scores[index.0] = sanitize(value);
        }
        Ok(Self { scores })
    }

    pub fn get(&self, index: ClassIndex) -> f64 {
        self.scores[index.0]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.scores.iter().sum()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.map(|s| s * factor)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            scores: self.scores.iter().map(|&s| f(s)).collect(),
        }
    }

    /// Wrap values already laid out in catalog order.
    pub(crate) fn from_catalog_order(scores: Vec<f64>) -> Self {
        Self { scores }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
