//! Boundary error type.
//!
//! Every handler returns `Result<T, ApiError>`. Component errors convert into
//! one of six tagged kinds and the status code is chosen from the tag alone.
//! Internal failures are logged in full but only a generic message reaches
//! the client.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::accounts::AccountError;
use crate::aggregate::ConversationError;
use crate::token::TokenError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Bad credentials or an unusable bearer token.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Authenticated, but not the owner of the resource.
    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (duplicate email or username).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store, hashing or signing failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Internal(detail) => {
                error!(detail = %detail, "internal server error");
                "internal server error".to_owned()
            }
            Self::Validation(m)
            | Self::Authentication(m)
            | Self::Authorization(m)
            | Self::NotFound(m)
            | Self::Conflict(m) => m,
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ConversationError> for ApiError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotFound => Self::NotFound("Conversation not found".into()),
            ConversationError::OwnerNotFound => Self::NotFound("User not found".into()),
            ConversationError::Forbidden => Self::Authorization("Access denied".into()),
            ConversationError::InvalidRole(_)
            | ConversationError::InvalidParent
            | ConversationError::Invalid(_) => Self::Validation(e.to_string()),
            ConversationError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Invalid(m) => Self::Validation(m),
            AccountError::EmailTaken | AccountError::UsernameTaken => Self::Conflict(e.to_string()),
            AccountError::InvalidCredentials => Self::Authentication(e.to_string()),
            AccountError::NotFound => Self::NotFound("User not found".into()),
            AccountError::Forbidden => Self::Authorization("Access denied".into()),
            AccountError::Hash(e) => Self::Internal(e.to_string()),
            AccountError::Token(e) => Self::Internal(e.to_string()),
            AccountError::Store(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => Self::Authentication("token expired".into()),
            TokenError::Malformed
            | TokenError::UnexpectedAlgorithm
            | TokenError::NotYetValid
            | TokenError::InvalidIssuer
            | TokenError::BadSignature => Self::Authentication("invalid token".into()),
            TokenError::MissingSecret | TokenError::InvalidLifetime | TokenError::Signing(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
