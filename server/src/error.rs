use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{ErrorResponse, TaskId};
use thiserror::Error;

/// Errores que ve el cliente del API.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Todos los slots de admisión están ocupados
    #[error("Server is busy. Try again later.")]
    ServerBusy,

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("invalid URL: {0}")]
    InvalidReference(String),

    #[error("file type not allowed: {0}")]
    UnsupportedType(String),

    #[error("maximum files per task reached ({max})")]
    QuotaExceeded { max: usize },

    #[error("archive not available: {0}")]
    ArchiveNotReady(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ArchiveError::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
            ArchiveError::TaskNotFound(_) | ArchiveError::ArchiveNotReady(_) => {
                StatusCode::NOT_FOUND
            }
            ArchiveError::InvalidReference(_)
            | ArchiveError::UnsupportedType(_)
            | ArchiveError::QuotaExceeded { .. } => StatusCode::BAD_REQUEST,
            ArchiveError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Fallo al bajar un archivo remoto. No es fatal para la tarea.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no filename in URL")]
    NoFilename,

    #[error("file exceeds the {0} byte limit")]
    TooLarge(u64),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

/// Fallos a nivel de contenedor: dejan la tarea en `failed`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to create zip file: {0}")]
    Create(#[source] std::io::Error),

    #[error("failed to finalize zip file: {0}")]
    Finalize(#[source] zip::result::ZipError),

    #[error("archive build timed out after {0:?}")]
    Timeout(Duration),

    #[error("archive build aborted: {0}")]
    Aborted(String),
}
