use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::oracle::OracleError;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("no network connectivity")]
    NoConnectivity,
    #[error("classifier service unavailable")]
    ServiceUnavailable,
    #[error("prediction timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("classifier invocation failed: {0}")]
    OracleInvocation(#[source] OracleError),
    #[error("no images were provided")]
    EmptyBatch,
    #[error("prediction service is misconfigured: {0}")]
    Initialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Es,
}

impl PredictionError {
    /// Stable, user-facing text. Transport details never leak into it.
    pub fn user_message(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (PredictionError::NoConnectivity, Locale::En) => {
                "No internet connection. Connect to a network and try again."
            }
            (PredictionError::NoConnectivity, Locale::Es) => {
                "Sin conexión a internet. Conéctate a una red e inténtalo de nuevo."
            }
            (PredictionError::ServiceUnavailable, Locale::En) => {
                "The analysis server is not available right now. Please try again later."
            }
            (PredictionError::ServiceUnavailable, Locale::Es) => {
                "El servidor de análisis no está disponible. Inténtalo más tarde."
            }
            (PredictionError::Timeout { .. }, Locale::En) => {
                "The analysis took too long. Check your connection and try again."
            }
            (PredictionError::Timeout { .. }, Locale::Es) => {
                "El análisis tardó demasiado. Revisa tu conexión e inténtalo de nuevo."
            }
            (PredictionError::OracleInvocation(_), Locale::En) => {
                "The image could not be analyzed. Please try again with another photo."
            }
            (PredictionError::OracleInvocation(_), Locale::Es) => {
                "No se pudo analizar la imagen. Inténtalo de nuevo con otra foto."
            }
            (PredictionError::EmptyBatch, Locale::En) => "Select at least one photo to analyze.",
            (PredictionError::EmptyBatch, Locale::Es) => "Selecciona al menos una foto para analizar.",
            (PredictionError::Initialization(_), Locale::En) => {
                "The analysis engine could not be started."
            }
            (PredictionError::Initialization(_), Locale::Es) => {
                "No se pudo iniciar el motor de análisis."
            }
        }
    }

    /// Oracle timeouts surface as `Timeout`, everything else as an invocation failure.
    pub(crate) fn from_oracle(err: OracleError, limit: Duration) -> Self {
        if err.is_timeout() {
            PredictionError::Timeout { after: limit }
        } else {
            PredictionError::OracleInvocation(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_kinds() -> Vec<PredictionError> {
        vec![
            PredictionError::NoConnectivity,
            PredictionError::ServiceUnavailable,
            PredictionError::Timeout {
                after: Duration::from_secs(30),
            },
            PredictionError::OracleInvocation(OracleError::Transport("connection reset".into())),
            PredictionError::EmptyBatch,
            PredictionError::Initialization("bad catalog".into()),
        ]
    }

    #[test]
    fn test_each_kind_has_a_distinct_message() {
        for locale in [Locale::En, Locale::Es] {
            let messages: Vec<&str> = all_kinds().iter().map(|e| e.user_message(locale)).collect();
            for (i, m) in messages.iter().enumerate() {
                assert!(!m.is_empty());
                assert!(!messages[..i].contains(m));
            }
        }
    }

    #[test]
    fn test_transport_detail_stays_out_of_message() {
        let err = PredictionError::OracleInvocation(OracleError::Transport("connection reset".into()));
        assert!(!err.user_message(Locale::En).contains("reset"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_oracle_timeout_maps_to_timeout() {
        let limit = Duration::from_secs(30);
        assert!(matches!(
            PredictionError::from_oracle(OracleError::Timeout, limit),
            PredictionError::Timeout { after } if after == limit
        ));
        assert!(matches!(
            PredictionError::from_oracle(OracleError::Backend("x".into()), limit),
            PredictionError::OracleInvocation(_)
        ));
    }
}
