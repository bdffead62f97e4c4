//! Auth routes and the auth gate.
//!
//! DESIGN
//! ======
//! `require_auth` guards whole route groups: it resolves the presented
//! token once, refuses with 401/403, and stores the `Identity` in request
//! extensions. `AuthUser` reads it back in handlers, and falls back to its
//! own lookup on ungated routes such as `/api/auth/me`.

use axum::extract::{FromRef, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

use super::Payload;
use crate::error::{ApiError, ErrorBody};
use crate::services::auth::{Identity, extract_token};
use crate::services::{account, session};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "session_token";

/// Matches the `sessions.expires_at` default.
const SESSION_MAX_AGE_DAYS: i64 = 30;

// =============================================================================
// GATE
// =============================================================================

/// Resolve the request's credential to an active identity.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(Identity, String), ApiError> {
    let token = extract_token(headers).ok_or(ApiError::Unauthorized)?;
    let identity = state.verifier.verify(&token).await?.ok_or(ApiError::Unauthorized)?;
    if !identity.active {
        return Err(ApiError::Forbidden("account is deactivated".into()));
    }
    Ok((identity, token))
}

/// Middleware for protected route groups.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    match authenticate(&state, request.headers()).await {
        Ok((identity, token)) => {
            request.extensions_mut().insert(identity);
            request.extensions_mut().insert(SessionToken(token));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Clone)]
struct SessionToken(String);

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated caller. Use as a handler parameter to require a session.
pub struct AuthUser {
    pub identity: Identity,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let (Some(identity), Some(SessionToken(token))) =
            (parts.extensions.get::<Identity>(), parts.extensions.get::<SessionToken>())
        {
            return Ok(Self { identity: identity.clone(), token: token.clone() });
        }

        let app_state = AppState::from_ref(state);
        let (identity, token) = authenticate(&app_state, &parts.headers).await?;
        Ok(Self { identity, token })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: Identity,
}

fn session_cookie(state: &AppState, token: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.is_production())
        .max_age(max_age)
        .build()
}

/// `POST /api/auth/register`
#[utoipa::path(
    post, path = "/api/auth/register", tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = account::register(&state.pool, &req.email, &req.name, &req.password).await?;
    let token = session::create_session(&state.pool, user.user_id).await?;
    tracing::info!(user_id = %user.user_id, "account registered");

    let jar = CookieJar::new().add(session_cookie(&state, token.clone(), Duration::days(SESSION_MAX_AGE_DAYS)));
    Ok((StatusCode::CREATED, jar, Json(AuthResponse { token, user })))
}

/// `POST /api/auth/login`
#[utoipa::path(
    post, path = "/api/auth/login", tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Account deactivated", body = ErrorBody),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = account::login(&state.pool, &req.email, &req.password).await?;
    let token = session::create_session(&state.pool, user.user_id).await?;

    let jar = CookieJar::new().add(session_cookie(&state, token.clone(), Duration::days(SESSION_MAX_AGE_DAYS)));
    Ok((jar, Json(AuthResponse { token, user })))
}

/// `POST /api/auth/logout`: delete the session, clear the cookie.
#[utoipa::path(
    post, path = "/api/auth/logout", tag = "auth",
    responses(
        (status = 204, description = "Session deleted"),
        (status = 401, description = "No session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> Result<impl IntoResponse, ApiError> {
    session::delete_session(&state.pool, &auth.token).await?;
    state.verifier.forget(&auth.token).await;

    let jar = CookieJar::new().add(session_cookie(&state, String::new(), Duration::ZERO));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// `GET /api/auth/me`
#[utoipa::path(
    get, path = "/api/auth/me", tag = "auth",
    responses(
        (status = 200, description = "Current identity", body = Identity),
        (status = 401, description = "No session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn me(auth: AuthUser) -> Json<Identity> {
    Json(auth.identity)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
