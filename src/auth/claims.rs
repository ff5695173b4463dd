use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token type used to distinguish Access, Refresh and Reset JWTs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[serde(alias = "Access")]
    Access,
    #[serde(alias = "Refresh")]
    Refresh,
    #[serde(alias = "Reset")]
    Reset,
}

/// Claims carried by a short-lived access token. Identity only: the
/// password hash and record timestamps are never signed into a token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub generation: i32,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

/// Claims carried by a long-lived refresh token. Same identity shape as
/// access claims; `generation` is checked against the live user record
/// at rotation time, which is the sole revocation mechanism.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    pub generation: i32,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

/// Claims carried by a password-reset token: the target email and the
/// one-time numeric code delivered out-of-band.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResetClaims {
    pub email: String,
    pub code: String,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}
