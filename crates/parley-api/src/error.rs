use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limited")]
    RateLimited,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message, "message": message }))).into_response()
    }
}

impl From<parley_core::error::CoreError> for ApiError {
    fn from(e: parley_core::error::CoreError) -> Self {
        match e {
            parley_core::error::CoreError::NotFound => ApiError::NotFound,
            parley_core::error::CoreError::Forbidden => ApiError::Forbidden,
            parley_core::error::CoreError::MissingPermission => ApiError::Forbidden,
            parley_core::error::CoreError::BadRequest(msg) => ApiError::BadRequest(msg),
            parley_core::error::CoreError::Conflict(msg) => ApiError::Conflict(msg),
            parley_core::error::CoreError::Database(_) => {
                ApiError::Internal(anyhow::anyhow!("database error"))
            }
            parley_core::error::CoreError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<parley_db::DbError> for ApiError {
    fn from(e: parley_db::DbError) -> Self {
        match e {
            parley_db::DbError::NotFound => ApiError::NotFound,
            parley_db::DbError::Sqlx(sqlx::Error::RowNotFound) => ApiError::NotFound,
            parley_db::DbError::Sqlx(_) => ApiError::Internal(anyhow::anyhow!("database error")),
            parley_db::DbError::Decode(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<parley_media::StorageError> for ApiError {
    fn from(e: parley_media::StorageError) -> Self {
        match e {
            parley_media::StorageError::TooLarge(_) | parley_media::StorageError::UnsupportedMime(_) => {
                ApiError::BadRequest(e.to_string())
            }
            parley_media::StorageError::NotFound => ApiError::NotFound,
            parley_media::StorageError::Io(_) => ApiError::Internal(anyhow::anyhow!("storage error")),
        }
    }
}
