use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::monitoring::MonitorError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "用户名或密码错误".to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::PasswordHashingError(msg) | AppError::TokenCreationError(msg) => {
                error!(error = %msg, "Credential handling failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::Storage(e) => {
                error!(error = %e, "Failed to persist request data.");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("保存失败: {e}"))
            }
            AppError::Monitor(e @ MonitorError::InvalidInterval) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            AppError::Monitor(e @ MonitorError::Scheduler(_)) => {
                (StatusCode::BAD_REQUEST, format!("启动监控失败: {e}"))
            }
            AppError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}
