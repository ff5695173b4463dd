use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for starting a password reset.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for exchanging a reset code for a reset credential.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
}

/// Request body for completing a password change. The reset credential
/// itself normally travels in the `resetToken` cookie.
#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
    #[serde(default)]
    pub reset_token: Option<String>,
}

/// Response returned after register or login. Tokens are also set as
/// cookies; the body carries them for header-based clients.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// Response returned after a successful reset-code exchange.
#[derive(Debug, Serialize)]
pub struct ResetTokenResponse {
    pub reset_token: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
}

/// One field-scoped failure, rendered next to the offending input.
#[derive(Debug, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}
