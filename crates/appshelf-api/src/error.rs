//! Error taxonomy shared by every handler and component.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::views;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    AuthFailure,

    #[error("App not found")]
    NotFound,

    #[error("Only the owner can do that")]
    Forbidden,

    #[error("An application file is required")]
    MissingRequiredFile,

    #[error("Unsupported media type for {field}: {content_type}")]
    UnsupportedMediaType { field: String, content_type: String },

    #[error("Unexpected field: {0}")]
    UnexpectedField(String),

    #[error("Too many files for field: {0}")]
    TooManyFiles(String),

    #[error("{0}")]
    Validation(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Storage error: {0}")]
    StorageFailure(#[from] std::io::Error),

    #[error("Database error: {0}")]
    PersistenceFailure(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateUsername => StatusCode::CONFLICT,
            AppError::AuthFailure => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::MissingRequiredFile
            | AppError::UnexpectedField(_)
            | AppError::TooManyFiles(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::StorageFailure(_) | AppError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the user. Internal failures are not described.
    pub fn public_message(&self) -> String {
        match self {
            AppError::StorageFailure(_) => "Could not store the uploaded files".to_string(),
            AppError::PersistenceFailure(_) => "Something went wrong, please retry".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }
        let page = views::error_page(status, &self.public_message());
        (status, Html(page)).into_response()
    }
}
