use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::certificate::CertificateError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(StoreError::DuplicateKey(_)) => StatusCode::CONFLICT,
            AppError::Certificate(CertificateError::RecordNotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Certificate(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "internal error");
        }
        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}
