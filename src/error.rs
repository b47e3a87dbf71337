use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Speaker not found: {0}")]
    SpeakerNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("TTS synthesis failed: {0}")]
    TtsError(String),

    #[error("Voice conversion failed: {0}")]
    ConversionError(String),

    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Fatal problems detected while building the speaker catalog at startup.
/// These never reach a client; `main` logs them and exits.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("no native voices found under {0}")]
    NoNativeVoices(String),

    #[error("speaker directory {dir} must contain exactly 1 index file, found {count}")]
    IndexFileCount { dir: String, count: usize },

    #[error("speaker directory {dir} must contain exactly 1 model file, found {count}")]
    ModelFileCount { dir: String, count: usize },

    #[error("model file {0} must live in its own subdirectory of the model root")]
    ModelOutsideSpeakerDir(String),

    #[error("default voice \"{0}\" is not in the native voice catalog")]
    UnknownDefaultVoice(String),

    #[error("base voice override for \"{speaker}\" names unknown voice \"{voice}\"")]
    UnknownOverrideVoice { speaker: String, voice: String },

    #[error("failed to read voice override file {path}: {source}")]
    OverrideFile {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error while scanning {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::SpeakerNotFound(s) => (
                StatusCode::NOT_FOUND,
                "SPEAKER_NOT_FOUND",
                format!("Speaker '{}' not found", s),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::TtsError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TTS_ERROR",
                msg.clone(),
            ),
            AppError::ConversionError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONVERSION_ERROR",
                msg.clone(),
            ),
            AppError::DeadlineExceeded => (
                StatusCode::GATEWAY_TIMEOUT,
                "DEADLINE_EXCEEDED",
                "request deadline exceeded before generation finished".to_string(),
            ),
            AppError::IoError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            AppError::JsonError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "JSON_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
