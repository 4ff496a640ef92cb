use std::path::PathBuf;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use crate::response::common_response::ErrorResponse;

/// Errors surfaced to HTTP callers. The `Display` text is the exact `error`
/// message written to the response body.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No file provided")]
    MissingFile,

    #[error("Invalid file type. Only images are allowed.")]
    InvalidFileType,

    #[error("File too large (max 5MB).")]
    FileTooLarge,

    #[error("Invalid image file")]
    InvalidImage,

    #[error("No route for {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Server,
}

impl Error {
    fn get_codes(&self) -> StatusCode {
        match *self {
            // 4XX Errors
            Error::MissingFile
            | Error::InvalidFileType
            | Error::FileTooLarge
            | Error::InvalidImage => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,

            // 5XX Errors
            Error::Server => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = self.get_codes();
        let body = Json(ErrorResponse { error: self.to_string() });

        (status_code, body).into_response()
    }
}

/// Startup failures while materializing the cascade or the emotion model.
#[derive(thiserror::Error, Debug)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid architecture description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt weights file {path}: {source}")]
    CorruptWeights {
        path: PathBuf,
        #[source]
        source: hdf5::Error,
    },

    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("layer {layer}: {reason}")]
    WeightMismatch { layer: String, reason: String },

    #[error("failed to load face cascade: {0}")]
    Cascade(String),
}

impl ModelLoadError {
    pub fn mismatch(layer: &str, reason: impl Into<String>) -> Self {
        ModelLoadError::WeightMismatch {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}
