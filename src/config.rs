//! Runtime configuration
//!
//! Layered: built-in defaults, then an optional YAML file, then `AGROSCAN_*`
//! environment variables (a `.env` file is loaded by the binary first).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::error::Locale;
use crate::oracle::PixelScaling;

pub const ENV_PREFIX: &str = "AGROSCAN_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Remote,
    Onnx,
    Simulated,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "api" => Ok(BackendKind::Remote),
            "onnx" | "local" => Ok(BackendKind::Onnx),
            "simulated" | "simulation" => Ok(BackendKind::Simulated),
            other => Err(format!("unknown backend {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgroConfig {
    pub backend: BackendKind,
    /// Base URL of the remote inference API.
    pub api_url: String,
    pub model_path: PathBuf,
    /// JSON `{"0": "Healthy", ...}` mapping; the built-in labels when absent.
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub pixel_scaling: PixelScaling,
    pub inference_threads: usize,
    pub probe_timeout_secs: u64,
    pub predict_timeout_secs: u64,
    /// Ask the remote API to run its own TTA on every call.
    pub server_tta: bool,
    /// Transform pixels for each TTA pass instead of reusing the source image.
    pub pixel_augmentation: bool,
    pub history_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub bind_address: String,
    pub locale: Locale,
}

impl Default for AgroConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Remote,
            api_url: "http://localhost:8000".to_string(),
            model_path: PathBuf::from("models/plant_disease_model.onnx"),
            labels_path: None,
            input_size: 224,
            pixel_scaling: PixelScaling::Raw,
            inference_threads: 4,
            probe_timeout_secs: 5,
            predict_timeout_secs: 30,
            server_tta: false,
            pixel_augmentation: true,
            history_path: PathBuf::from("scan_history.json"),
            log_dir: None,
            bind_address: "0.0.0.0:8000".to_string(),
            locale: Locale::En,
        }
    }
}

impl AgroConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override fields from `AGROSCAN_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("BACKEND") {
            self.backend = parse("BACKEND", &v)?;
        }
        if let Some(v) = var("API_URL") {
            self.api_url = v;
        }
        if let Some(v) = var("MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = var("LABELS_PATH") {
            self.labels_path = Some(PathBuf::from(v));
        }
        if let Some(v) = var("INPUT_SIZE") {
            self.input_size = parse("INPUT_SIZE", &v)?;
        }
        if let Some(v) = var("THREADS") {
            self.inference_threads = parse("THREADS", &v)?;
        }
        if let Some(v) = var("PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = parse("PROBE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("PREDICT_TIMEOUT_SECS") {
            self.predict_timeout_secs = parse("PREDICT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("SERVER_TTA") {
            self.server_tta = parse_flag("SERVER_TTA", &v)?;
        }
        if let Some(v) = var("PIXEL_AUGMENTATION") {
            self.pixel_augmentation = parse_flag("PIXEL_AUGMENTATION", &v)?;
        }
        if let Some(v) = var("HISTORY_PATH") {
            self.history_path = PathBuf::from(v);
        }
        if let Some(v) = var("LOG_DIR") {
            self.log_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("BIND") {
            self.bind_address = v;
        }
        if let Some(v) = var("LOCALE") {
            self.locale = match v.trim().to_ascii_lowercase().as_str() {
                "en" => Locale::En,
                "es" => Locale::Es,
                _ => return Err(invalid("LOCALE", &v)),
            };
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn predict_timeout(&self) -> Duration {
        Duration::from_secs(self.predict_timeout_secs)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, key),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = AgroConfig::from_yaml(
            "backend: onnx\ninput_size: 256\npixel_scaling: caffe_imagenet\nlocale: es\n",
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Onnx);
        assert_eq!(config.input_size, 256);
        assert_eq!(config.pixel_scaling, PixelScaling::CaffeImagenet);
        assert_eq!(config.locale, Locale::Es);
        assert_eq!(config.predict_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("AGROSCAN_BACKEND", "simulated"),
            ("AGROSCAN_API_URL", "http://10.0.0.2:8000"),
            ("AGROSCAN_SERVER_TTA", "yes"),
            ("AGROSCAN_PROBE_TIMEOUT_SECS", "2"),
        ]
        .into_iter()
        .collect();

        let mut config = AgroConfig::from_yaml("backend: onnx\napi_url: http://a\n").unwrap();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.backend, BackendKind::Simulated);
        assert_eq!(config.api_url, "http://10.0.0.2:8000");
        assert!(config.server_tta);
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = AgroConfig::default();
        let err = config
            .apply_env(|k| (k == "AGROSCAN_INPUT_SIZE").then(|| "big".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "AGROSCAN_INPUT_SIZE"));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agroscan.yaml");
        std::fs::write(&path, "bind_address: 127.0.0.1:9000\n").unwrap();
        let config = AgroConfig::from_file(&path).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert!(AgroConfig::from_file(&dir.path().join("missing.yaml")).is_err());
    }
}
