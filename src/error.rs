use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::StoreError;

/// FieldError
///
/// One failing input field. Validation always reports every failing field, not
/// only the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
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

/// AppError
///
/// The error taxonomy shared by every core operation. Each variant maps to one
/// HTTP status in the `IntoResponse` implementation below.
///
/// `Unauthenticated` (no actor at all) and `Forbidden` (an actor the policy
/// denies) are kept apart so clients can choose between a login prompt and a
/// permission message.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input, with per-field detail.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// The operation needs an authenticated actor and there is none.
    #[error("{0}")]
    Unauthenticated(String),

    /// Credentials or a token were presented but rejected.
    #[error("{0}")]
    Auth(String),

    /// The actor is known but the policy denies the operation.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A uniqueness invariant would be violated (duplicate enrollment, chapter order).
    #[error("{0}")]
    Conflict(String),

    /// The backing store failed. Surfaced unchanged, never retried.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),

    /// A server-side failure outside the store (token signing, password hashing).
    #[error("internal error: {0}")]
    Internal(String),
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated("Authentication credentials were not provided.".to_string())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    /// Stable machine-readable code used in the JSON envelope.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::InvalidRequest,
            AppError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            AppError::Auth(_) => ErrorCode::InvalidCredentials,
            AppError::Forbidden(_) => ErrorCode::Forbidden,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Storage(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.code() {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated | ErrorCode::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Unique violations that reach this conversion are uniqueness invariants of
/// the domain (enrollment, chapter order). Registration and profile updates map
/// their own constraints to field errors before getting here.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { constraint } => {
                AppError::Conflict(conflict_message(&constraint))
            }
            // The parent row vanished between lookup and insert.
            StoreError::ForeignKeyViolation { .. } => {
                AppError::NotFound("The referenced course no longer exists.".to_string())
            }
            other => AppError::Storage(other),
        }
    }
}

fn conflict_message(constraint: &str) -> String {
    match constraint {
        crate::repository::ENROLLMENT_UNIQUE => {
            "You are already enrolled in this course.".to_string()
        }
        crate::repository::CHAPTER_ORDER_UNIQUE => {
            "A chapter with this order already exists in the course.".to_string()
        }
        other => format!("Duplicate value violates `{other}`."),
    }
}

/// ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Unauthenticated,
    InvalidCredentials,
    Forbidden,
    NotFound,
    Conflict,
    InternalError,
}

/// ErrorBody
///
/// JSON envelope returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(fields) => ErrorBody {
                code: ErrorCode::InvalidRequest,
                message: "Invalid input.".to_string(),
                fields,
            },
            AppError::Storage(ref err) => {
                // The detail stays in the logs; clients get a generic message.
                tracing::error!("storage failure: {:?}", err);
                ErrorBody {
                    code: ErrorCode::InternalError,
                    message: "Internal server error.".to_string(),
                    fields: Vec::new(),
                }
            }
            AppError::Internal(ref reason) => {
                tracing::error!("internal error: {}", reason);
                ErrorBody {
                    code: ErrorCode::InternalError,
                    message: "Internal server error.".to_string(),
                    fields: Vec::new(),
                }
            }
            other => ErrorBody {
                code: other.code(),
                message: other.to_string(),
                fields: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}
