//! Scan History
//!
//! Every completed prediction can be kept in a small JSON file, newest first,
//! so the app can list past scans and chart the last week of activity.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::oracle::ImageRef;
use crate::prediction::PredictionResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub image_uri: String,
    pub label: String,
    pub confidence: f64,
    #[serde(rename = "usedTTA")]
    pub used_tta: bool,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(image: &ImageRef, result: &PredictionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            image_uri: image.uri(),
            label: result.top_prediction.label.clone(),
            confidence: result.top_prediction.confidence,
            used_tta: result.used_tta,
            recorded_at: Utc::now(),
        }
    }
}

pub struct HistoryStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store the top prediction of `result`.
    pub async fn record(&self, image: &ImageRef, result: &PredictionResult) -> Result<HistoryEntry> {
        let entry = HistoryEntry::from_result(image, result);
        self.append(entry.clone()).await?;
        Ok(entry)
    }

    /// Insert `entry` at the front of the history.
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        debug!("Recording {} ({}) in scan history", entry.label, entry.id);
        entries.insert(0, entry);
        self.write_entries(&entries).await
    }

    /// All entries, most recent first.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.lock.lock().await;
        self.read_entries().await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.list().await?.len())
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.exists().await? {
            fs::remove_file(&self.path)
                .await
                .context("Failed to remove history file")?;
        }
        Ok(())
    }

    /// Scans per day for the week ending on `today`; index 6 is `today`.
    pub async fn last_seven_days(&self, today: NaiveDate) -> Result<[u32; 7]> {
        let entries = self.list().await?;
        let mut counts = [0u32; 7];
        for (slot, count) in counts.iter_mut().enumerate() {
            let day = today - Duration::days(6 - slot as i64);
            *count = entries
                .iter()
                .filter(|e| e.recorded_at.date_naive() == day)
                .count() as u32;
        }
        Ok(counts)
    }

    async fn exists(&self) -> Result<bool> {
        fs::try_exists(&self.path)
            .await
            .with_context(|| format!("Failed to access history file {}", self.path.display()))
    }

    async fn read_entries(&self) -> Result<Vec<HistoryEntry>> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read history file")?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&json).context("Failed to deserialize history")
    }

    async fn write_entries(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create history directory")?;
            }
        }

        let json = serde_json::to_string_pretty(entries).context("Failed to serialize history")?;
        fs::write(&self.path, json)
            .await
            .context("Failed to write history file")
    }
}
