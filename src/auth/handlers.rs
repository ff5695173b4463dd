use axum::{
    extract::{FromRef, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, PublicUser, RegisterRequest,
            ResetPasswordRequest, ResetTokenResponse, SuccessResponse, UpdatePasswordRequest,
        },
        error::AuthError,
        service::{AuthService, TokenPair},
        session::{
            require_login, token_cookie, CurrentUser, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
            RESET_TOKEN_COOKIE,
        },
        store::User,
    },
    state::AppState,
};

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(state, require_login));

    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/update-password", post(update_password))
        .merge(protected)
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

fn session_cookies(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(token_cookie(ACCESS_TOKEN_COOKIE, tokens.access_token.clone()))
        .add(token_cookie(REFRESH_TOKEN_COOKIE, tokens.refresh_token.clone()))
}

fn auth_response(user: User, tokens: TokenPair) -> AuthResponse {
    AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: PublicUser {
            id: user.id,
            email: user.email,
            username: user.username,
        },
    }
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let email = normalize_email(&payload.email)?;
    let service = AuthService::from_ref(&state);
    let (user, tokens) = service
        .register(&email, payload.username.trim(), &payload.password)
        .await?;
    let jar = session_cookies(jar, &tokens);
    Ok((jar, Json(auth_response(user, tokens))))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AuthError> {
    let email = normalize_email(&payload.email)?;
    let service = AuthService::from_ref(&state);
    let (user, tokens) = service.login(&email, &payload.password).await?;
    let jar = session_cookies(jar, &tokens);
    Ok((jar, Json(auth_response(user, tokens))))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    let email = normalize_email(&payload.email)?;
    let service = AuthService::from_ref(&state);
    service.forgot_password(&email).await?;
    Ok(Json(SuccessResponse { success: true }))
}

#[instrument(skip(state, jar, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<ResetTokenResponse>), AuthError> {
    let email = normalize_email(&payload.email)?;
    let service = AuthService::from_ref(&state);
    let reset_token = service.reset_password(&email, payload.code.trim()).await?;
    // One-shot credential for the follow-up update-password call.
    let jar = jar.add(token_cookie(RESET_TOKEN_COOKIE, reset_token.clone()));
    Ok((jar, Json(ResetTokenResponse { reset_token })))
}

#[instrument(skip(state, jar, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, Json<SuccessResponse>), AuthError> {
    let credential = jar
        .get(RESET_TOKEN_COOKIE)
        .map(|c| c.value().to_owned())
        .or(payload.reset_token)
        .ok_or(AuthError::InvalidResetToken)?;

    let service = AuthService::from_ref(&state);
    service.update_password(&credential, &payload.password).await?;

    let jar = jar.remove(token_cookie(RESET_TOKEN_COOKIE, String::new()));
    Ok((jar, Json(SuccessResponse { success: true })))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .store
        .find_by_id(claims.sub)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(Json(PublicUser {
        id: user.id,
        email: user.email,
        username: user.username,
    }))
}
