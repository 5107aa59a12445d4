// Handler error taxonomy.
//
// Validation failures are the caller's fault and map to 400, oversized
// uploads to 413. Everything unexpected maps to 500 with a "<Modality> analysis failed: ..." message.
// Adapter failures never reach here; they become zero-score verdicts.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use super::api_error;

/// Which endpoint produced the error, for the 500 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "Text",
            Modality::Image => "Image",
            Modality::Audio => "Audio",
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    TooLarge(String),
    #[error("{} analysis failed: {cause:#}", modality.as_str())]
    Unexpected {
        modality: Modality,
        cause: anyhow::Error,
    },
}

impl AnalyzeError {
    pub fn validation(message: impl Into<String>) -> Self {
        AnalyzeError::Validation(message.into())
    }

    pub fn unexpected(modality: Modality, source: impl Into<anyhow::Error>) -> Self {
        AnalyzeError::Unexpected {
            modality,
            cause: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AnalyzeError::Validation(_) => StatusCode::BAD_REQUEST,
            AnalyzeError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalyzeError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        if let AnalyzeError::Unexpected { modality, cause } = &self {
            error!(modality = modality.as_str(), error = %cause, "Analysis failed");
        }
        api_error(self.status(), &self.to_string())
    }
}
