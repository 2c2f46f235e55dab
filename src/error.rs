use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::response::ApiResponse;

/// Every failure that can cross the service boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email not verified")]
    EmailNotVerified,

    #[error("email already registered")]
    EmailAlreadyRegistered,

    #[error("challenge already completed")]
    DuplicateCompletion,

    #[error("invalid or expired token")]
    TokenInvalid,

    #[error("user not found")]
    UserNotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("storage timed out")]
    StorageTimeout,

    /// Context is for logs only and never reaches the client.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Identity provider unreachable or answering garbage.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::EmailAlreadyRegistered => StatusCode::CONFLICT,
            Self::DuplicateCompletion => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StorageTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::StorageFailure(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show to an untrusted caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::InvalidCredentials => "Invalid credentials".into(),
            Self::EmailNotVerified => "Please verify your email before signing in".into(),
            Self::EmailAlreadyRegistered => "Email is already registered and verified".into(),
            Self::DuplicateCompletion => "You have already completed this challenge".into(),
            Self::TokenInvalid => "Invalid or expired token".into(),
            Self::UserNotFound => "User not found".into(),
            Self::Forbidden => "You are not allowed to perform this action".into(),
            Self::StorageTimeout => "Service temporarily unavailable, please retry".into(),
            Self::StorageFailure(_) | Self::Internal(_) => "Internal server error".into(),
            Self::Upstream(_) => "Identity provider unavailable, please retry".into(),
        }
    }

    /// Timeouts may be retried; nothing was committed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageTimeout | Self::Upstream(_))
    }
}

/// Wraps a driver error with context; the raw error is logged, never returned.
pub(crate) fn storage_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        error!(error = %e, context, "storage error");
        AppError::StorageFailure(context.to_string())
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "json body rejected");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::validation("Expected a JSON body"),
            _ => Self::validation("Malformed JSON body"),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(error = %rejection.body_text(), "path rejected");
        Self::validation("Invalid path parameter")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(error = %rejection.body_text(), "query rejected");
        Self::validation("Invalid query parameters")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        let body: ApiResponse<()> = ApiResponse::failure(self.public_message());
        (status, Json(body)).into_response()
    }
}
