use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{debug, warn};

use crate::{
    auth::{claims::AccessClaims, error::AuthError, jwt::JwtKeys, service::TokenPair, store::UserStore},
    state::AppState,
};

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
pub const RESET_TOKEN_COOKIE: &str = "resetToken";

/// Outcome of a successful authentication attempt.
#[derive(Debug)]
pub enum Authenticated {
    /// The access token was valid; nothing was rotated.
    ViaAccess(AccessClaims),
    /// The access token was unusable but the refresh token's generation
    /// matched the live record; a fresh pair was minted.
    ViaRefresh {
        claims: AccessClaims,
        rotated: TokenPair,
    },
}

/// The rotation state machine. Accepts a valid access token outright;
/// otherwise falls back to the refresh token, checking its embedded
/// generation against the live user record. A mismatch means the token
/// was revoked by a password change and the request is rejected. An
/// unknown user on the refresh path is rejected as well.
pub async fn authenticate(
    keys: &JwtKeys,
    store: &dyn UserStore,
    access: Option<&str>,
    refresh: Option<&str>,
) -> Result<Authenticated, AuthError> {
    if access.is_none() && refresh.is_none() {
        return Err(AuthError::Unauthorized);
    }

    if let Some(token) = access {
        if let Ok(claims) = keys.verify_access(token) {
            return Ok(Authenticated::ViaAccess(claims));
        }
    }

    let refresh = refresh.ok_or(AuthError::Unauthorized)?;
    let refresh_claims = keys.verify_refresh(refresh)?;

    let user = store
        .find_by_id(refresh_claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %refresh_claims.sub, "refresh token for unknown user");
            AuthError::Unauthorized
        })?;

    if refresh_claims.generation != user.generation {
        warn!(
            user_id = %user.id,
            token_generation = refresh_claims.generation,
            live_generation = user.generation,
            "refresh token revoked by generation bump"
        );
        return Err(AuthError::Unauthorized);
    }

    // Bind the new pair to the current record, not the old claims.
    let rotated = TokenPair {
        access_token: keys.sign_access(&user)?,
        refresh_token: keys.sign_refresh(&user)?,
    };
    let claims = keys.verify_access(&rotated.access_token)?;
    debug!(user_id = %user.id, "session rotated via refresh token");
    Ok(Authenticated::ViaRefresh { claims, rotated })
}

fn credential(jar: &CookieJar, headers: &HeaderMap, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_owned())
        .or_else(|| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        })
}

pub(crate) fn token_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value)).path("/").http_only(true).build()
}

/// Middleware guarding authenticated routes. On silent rotation the fresh
/// pair replaces the caller's cookies in the response.
pub async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let access = credential(&jar, req.headers(), ACCESS_TOKEN_COOKIE);
    let refresh = credential(&jar, req.headers(), REFRESH_TOKEN_COOKIE);

    let outcome = authenticate(
        &keys,
        state.store.as_ref(),
        access.as_deref(),
        refresh.as_deref(),
    )
    .await?;

    let (claims, jar) = match outcome {
        Authenticated::ViaAccess(claims) => (claims, jar),
        Authenticated::ViaRefresh { claims, rotated } => {
            let jar = jar
                .add(token_cookie(ACCESS_TOKEN_COOKIE, rotated.access_token))
                .add(token_cookie(REFRESH_TOKEN_COOKIE, rotated.refresh_token));
            (claims, jar)
        }
    };

    req.extensions_mut().insert(claims);
    Ok((jar, next.run(req).await).into_response())
}

/// Identity attached by `require_login`, for handlers behind it.
pub struct CurrentUser(pub AccessClaims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::Unauthorized)
    }
}
