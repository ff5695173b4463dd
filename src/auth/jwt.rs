use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::{
        claims::{AccessClaims, RefreshClaims, ResetClaims, TokenKind},
        store::User,
    },
    config::AuthConfig,
    state::AppState,
};

/// Why a token failed verification. The rotation path collapses all of
/// these into `Unauthorized` before anything reaches a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    Invalid,
    #[error("malformed token")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::Invalid,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            _ => TokenError::Invalid,
        }
    }
}

/// Signing and verification keys for all three token kinds. Each kind has
/// its own secret; a token signed for one kind never verifies as another.
#[derive(Clone)]
pub struct JwtKeys {
    pub access_encoding: EncodingKey,
    pub access_decoding: DecodingKey,
    pub refresh_encoding: EncodingKey,
    pub refresh_decoding: DecodingKey,
    pub reset_encoding: EncodingKey,
    pub reset_decoding: DecodingKey,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.auth)
    }
}

fn timestamps(ttl: Duration) -> (usize, usize) {
    let now = OffsetDateTime::now_utc();
    let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
    (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
}

impl JwtKeys {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            reset_encoding: EncodingKey::from_secret(cfg.reset_secret.as_bytes()),
            reset_decoding: DecodingKey::from_secret(cfg.reset_secret.as_bytes()),
            access_ttl: Duration::from_secs(cfg.access_ttl_secs),
            refresh_ttl: Duration::from_secs(cfg.refresh_ttl_secs),
            reset_ttl: Duration::from_secs(cfg.reset_ttl_secs),
        }
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        let (iat, exp) = timestamps(self.access_ttl);
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            generation: user.generation,
            iat,
            exp,
            kind: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &self.access_encoding)?;
        debug!(user_id = %user.id, "access token signed");
        Ok(token)
    }

    pub fn sign_refresh(&self, user: &User) -> anyhow::Result<String> {
        let (iat, exp) = timestamps(self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            generation: user.generation,
            iat,
            exp,
            kind: TokenKind::Refresh,
        };
        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        debug!(user_id = %user.id, "refresh token signed");
        Ok(token)
    }

    pub fn sign_reset(&self, email: &str, code: &str) -> anyhow::Result<String> {
        let (iat, exp) = timestamps(self.reset_ttl);
        let claims = ResetClaims {
            email: email.to_owned(),
            code: code.to_owned(),
            iat,
            exp,
            kind: TokenKind::Reset,
        };
        let token = encode(&Header::default(), &claims, &self.reset_encoding)?;
        debug!(email = %email, "reset token signed");
        Ok(token)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, &self.access_decoding, &Validation::default())?;
        // Kind tag is checked on top of the per-kind secret, so a
        // misconfigured deployment with shared secrets still rejects
        // cross-kind substitution.
        if data.claims.kind != TokenKind::Access {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = decode::<RefreshClaims>(token, &self.refresh_decoding, &Validation::default())?;
        if data.claims.kind != TokenKind::Refresh {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }

    pub fn verify_reset(&self, token: &str) -> Result<ResetClaims, TokenError> {
        let data = decode::<ResetClaims>(token, &self.reset_decoding, &Validation::default())?;
        if data.claims.kind != TokenKind::Reset {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}
