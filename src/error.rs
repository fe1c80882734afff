/// Application Error Handling
///
/// One error type flows from the store, through the auth core, up to the
/// HTTP boundary. At the boundary every variant is mapped to a status code
/// and the `{success, message, errors}` envelope. Storage and internal
/// failures are logged with a request id and reported to the client with a
/// generic message only.

use actix_web::{error::ResponseError, http::header, http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::response::ApiResponse;

/// Message returned for every 5xx response
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred. Please try again.";

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a storage adapter
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Central application error
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    Locked(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    pub fn field(field: &str, message: &str) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    /// Message that is safe to show to the client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Validation failed".to_string(),
            AppError::RateLimited { .. } => "Too many requests. Please try again later.".to_string(),
            AppError::Store(_) | AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Locked(msg) => msg.clone(),
        }
    }
}

/// Converts errors to HTTP payloads and logs them with a request id
pub trait ErrorHandler {
    fn error_body(&self) -> ApiResponse<()>;
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_body(&self) -> ApiResponse<()> {
        let errors = match self {
            AppError::Validation(fields) => Some(fields.clone()),
            _ => None,
        };
        ApiResponse::failure(self.public_message(), errors)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Store error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
            AppError::Locked(_) | AppError::RateLimited { .. } => {
                tracing::warn!(request_id = request_id, error = %self, "Request throttled");
            }
            AppError::Unauthorized(_) | AppError::Forbidden(_) => {
                tracing::info!(request_id = request_id, error = %self, "Access denied");
            }
            _ => {
                tracing::debug!(request_id = request_id, error = %self, "Client error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } | AppError::Locked(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let mut builder = HttpResponse::build(self.status_code());
        if let AppError::RateLimited { retry_after_secs } = self {
            builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
        }
        builder.json(self.error_body())
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

/// Operation context carried through a handler for log correlation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: &'static str,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation,
        }
    }
}
