//! Service-level error type and its HTTP mapping

use crate::cache::CacheError;
use crate::compression::CompressionError;
use crate::metadata::RepositoryError;
use crate::storage::StorageError;
use crate::token::TokenError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasteError {
    /// Missing, expired, soft-deleted, or the credential did not match.
    #[error("paste not found")]
    NotFound,

    #[error("insufficient storage: {available} bytes available, {required} bytes required")]
    CapacityExceeded { available: u64, required: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for PasteError {
    fn from(e: RepositoryError) -> Self {
        PasteError::Database(e.to_string())
    }
}

impl From<TokenError> for PasteError {
    fn from(e: TokenError) -> Self {
        PasteError::Token(e.to_string())
    }
}

impl From<CompressionError> for PasteError {
    fn from(e: CompressionError) -> Self {
        PasteError::Compression(e.to_string())
    }
}

impl From<CacheError> for PasteError {
    fn from(e: CacheError) -> Self {
        PasteError::Cache(e.to_string())
    }
}

impl From<tokio::task::JoinError> for PasteError {
    fn from(e: tokio::task::JoinError) -> Self {
        PasteError::Internal(format!("background task failed: {}", e))
    }
}

impl ResponseError for PasteError {
    fn status_code(&self) -> StatusCode {
        match self {
            PasteError::NotFound => StatusCode::NOT_FOUND,
            PasteError::CapacityExceeded { .. } => StatusCode::INSUFFICIENT_STORAGE,
            PasteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // backend details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status).json(json!({ "error": message }))
    }
}
