use std::collections::BTreeMap;

use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Per-field validation messages, serialized as `{"field": ["message", ...]}`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(FieldErrors),
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Invalid token.")]
    InvalidToken,
    #[error("You do not have permission to perform this action.")]
    PermissionDenied,
    #[error("Not found.")]
    NotFound,
    #[error("Invalid page.")]
    InvalidPage,
    #[error("database is unavailable")]
    Unavailable,
    #[error("database error: {0}")]
    Database(DieselError),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("blocking task was cancelled")]
    Blocking(#[from] BlockingError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf rendering failed: {0}")]
    Pdf(String),
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => ApiError::NotFound,
            other => ApiError::Database(other),
        }
    }
}

impl ApiError {
    /// Errors that say something about the health of the database rather
    /// than about the request. Only these count against the circuit breaker;
    /// a statement MySQL refuses (bad data, constraints) does not.
    pub fn is_outage(&self) -> bool {
        match self {
            ApiError::Pool(_) | ApiError::Unavailable => true,
            ApiError::Database(DieselError::DatabaseError(_, info)) => {
                is_connection_failure(info.message())
            }
            _ => false,
        }
    }
}

/// MySQL client messages for a connection that dropped mid-request.
const CONNECTION_FAILURES: [&str; 4] = [
    "server has gone away",
    "Lost connection to MySQL server",
    "Can't connect to MySQL server",
    "Too many connections",
];

fn is_connection_failure(message: &str) -> bool {
    CONNECTION_FAILURES.iter().any(|needle| message.contains(needle))
}

pub(crate) fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthenticated | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound | ApiError::InvalidPage => StatusCode::NOT_FOUND,
            ApiError::Unavailable | ApiError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Blocking(_) | ApiError::Io(_) | ApiError::Pdf(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            ApiError::Validation(errors) => json!(errors),
            ApiError::BadRequest(message) => json!({ "errors": message }),
            _ if status.is_server_error() => {
                log::error!("request failed: {}", self);
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    json!({ "detail": "Service temporarily unavailable." })
                } else {
                    json!({ "detail": "Internal server error." })
                }
            }
            other => json!({ "detail": other.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}
