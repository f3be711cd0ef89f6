use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::OracleError;

/// Opaque handle to the image being classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    /// Image on the local filesystem.
    File(PathBuf),
    /// Image already in memory, e.g. an upload or an augmented view.
    Bytes { name: String, data: Arc<[u8]> },
}

impl ImageRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageRef::File(path.into())
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        ImageRef::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Final path segment, used as the multipart filename.
    pub fn file_name(&self) -> String {
        let name = match self {
            ImageRef::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            ImageRef::Bytes { name, .. } => name
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string(),
        };

        if name.is_empty() {
            "image.jpg".to_string()
        } else {
            name
        }
    }

    /// Human readable location for logs and history.
    pub fn uri(&self) -> String {
        match self {
            ImageRef::File(path) => path.display().to_string(),
            ImageRef::Bytes { name, .. } => format!("memory://{}", name),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        mime_type_for(&self.file_name())
    }

    pub async fn read(&self) -> Result<Arc<[u8]>, OracleError> {
        match self {
            ImageRef::File(path) => {
                let data = tokio::fs::read(path).await?;
                Ok(data.into())
            }
            ImageRef::Bytes { data, .. } => Ok(data.clone()),
        }
    }
}

impl From<&Path> for ImageRef {
    fn from(path: &Path) -> Self {
        ImageRef::File(path.to_path_buf())
    }
}

/// MIME type from the file extension, defaulting to JPEG.
pub(crate) fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}
