use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{dto::FieldError, jwt::TokenError, store::StoreError};

/// Business-rule and authentication failures. The first group is returned
/// to callers as values with a field path for display; `Unauthorized`
/// short-circuits request handling; `Internal` carries the cause for
/// logging only and never leaks it to the client.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("email already exists")]
    EmailExists,
    #[error("username already exists")]
    UsernameExists,
    #[error("email does not exist")]
    EmailNotFound,
    #[error("invalid code")]
    InvalidCode,
    #[error("invalid reset token")]
    InvalidResetToken,
    #[error("invalid email")]
    InvalidEmail,
    #[error("password too short")]
    PasswordTooShort,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal failure")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::EmailExists,
            StoreError::DuplicateUsername => AuthError::UsernameExists,
            other => AuthError::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err)
    }
}

impl AuthError {
    /// Which input field the failure belongs to, mirroring the error
    /// payloads clients render next to form fields.
    fn path(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials
            | AuthError::EmailExists
            | AuthError::EmailNotFound
            | AuthError::InvalidEmail => "email",
            AuthError::UsernameExists => "username",
            AuthError::InvalidCode => "code",
            AuthError::InvalidResetToken => "resetToken",
            AuthError::PasswordTooShort => "password",
            AuthError::Unauthorized | AuthError::Internal(_) => "",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::EmailExists | AuthError::UsernameExists => StatusCode::CONFLICT,
            AuthError::EmailNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidCode
            | AuthError::InvalidResetToken
            | AuthError::InvalidEmail
            | AuthError::PasswordTooShort => StatusCode::BAD_REQUEST,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Collapse any token failure on the rotation path into `Unauthorized`.
/// Expired and invalid stay distinct inside `TokenError` for callers that
/// need the difference.
impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        warn!(error = %err, "token rejected");
        AuthError::Unauthorized
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AuthError::Internal(cause) => {
                error!(error = %cause, "internal failure");
                "internal failure".to_owned()
            }
            other => other.to_string(),
        };
        let body = Json(serde_json::json!({
            "errors": [FieldError { path: self.path().to_owned(), message }]
        }));
        (status, body).into_response()
    }
}
