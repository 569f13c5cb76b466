use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// The driver could not hand out a connection handle
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database rejected or failed to run a query
    #[error("Query error: {0}")]
    Query(String),

    /// A column value could not be coerced to the expected type
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Wraps the first connection or query failure hit while listing
    #[error("Failed to list keys: {0}")]
    Aggregation(Box<AppError>),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a listing failure, leaving already-wrapped errors alone
    pub fn aggregation(err: AppError) -> Self {
        match err {
            AppError::Aggregation(_) => err,
            other => AppError::Aggregation(Box::new(other)),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match self {
            AppError::Connection(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("CONNECTION_ERROR", msg),
            ),
            AppError::Query(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("QUERY_ERROR", msg),
            ),
            AppError::Decode(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DECODE_ERROR", msg),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", msg),
            ),
            AppError::Aggregation(inner) => {
                let status = match inner.as_ref() {
                    AppError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    ErrorDetail::new("AGGREGATION_ERROR", "Failed to list keys from all owners")
                        .with_details(inner.to_string()),
                )
            }
            AppError::InvalidSql(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SQL", msg),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("FORBIDDEN", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_detail,
        });

        (status, body).into_response()
    }
}

/// Statement failures from SQLite are always query errors; open failures are
/// classified by the driver itself
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Query(err.to_string())
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return AppError::Connection(err.to_string());
        }
        match err.as_db_error() {
            Some(db_error) => AppError::Query(format!(
                "Code: {}, Message: {}",
                db_error.code().code(),
                db_error.message()
            )),
            None => AppError::Query(err.to_string()),
        }
    }
}

impl From<mysql_async::Error> for AppError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Io(_) | mysql_async::Error::Url(_) => {
                AppError::Connection(err.to_string())
            }
            other => AppError::Query(other.to_string()),
        }
    }
}
