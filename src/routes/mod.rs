//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the REST API, the health check, the API docs and
//! the realtime gateway on a single listener. REST traffic runs through
//! the middleware chain described in `crate::middleware`; `/ws` is merged
//! in after the chain is applied and bypasses it.
//!
//! Everything under `/api/models`, `/api/users`, `/api/training`,
//! `/api/deployment` and `/api/analytics` sits behind `auth::require_auth`,
//! including paths no handler matches. Anything else unmatched gets the
//! JSON 404.

pub mod analytics;
pub mod auth;
pub mod deployment;
pub mod docs;
pub mod health;
pub mod marketplace;
pub mod models;
pub mod training;
pub mod users;

use std::any::Any;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Form, FromRequest, FromRequestParts, OriginalUri, Request};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::{ApiError, json_error};
use crate::middleware::{BODY_LIMIT_BYTES, access_log, body_limit, rate_limit, security_headers};
use crate::realtime::{Gateway, Registry, ws};
use crate::state::AppState;

/// Build the complete application router.
pub fn app(state: AppState, registry: Arc<Registry>) -> Router {
    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/docs", get(docs::swagger_ui))
        .route("/api/docs/openapi.json", get(docs::openapi_json))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/marketplace", get(marketplace::list_marketplace))
        .route("/api/marketplace/{id}", get(marketplace::get_listing));

    let models = Router::new()
        .route("/", get(models::list_models).post(models::create_model))
        .route(
            "/{id}",
            get(models::get_model)
                .patch(models::update_model)
                .delete(models::delete_model),
        );
    let users = Router::new().route("/me", get(users::get_profile).patch(users::update_profile));
    let training = Router::new()
        .route("/", get(training::list_jobs).post(training::create_job))
        .route("/{id}", get(training::get_job))
        .route("/{id}/cancel", post(training::cancel_job));
    let deployment = Router::new()
        .route("/", get(deployment::list_deployments).post(deployment::create_deployment))
        .route("/{id}", get(deployment::get_deployment).delete(deployment::stop_deployment));
    let analytics = Router::new().route("/", get(analytics::summary));

    let protected = Router::new()
        .nest("/api/models", gated(&state, models))
        .nest("/api/users", gated(&state, users))
        .nest("/api/training", gated(&state, training))
        .nest("/api/deployment", gated(&state, deployment))
        .nest("/api/analytics", gated(&state, analytics));

    // `layer` wraps everything added before it: the last call is outermost.
    let api = public
        .merge(protected)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .layer(axum::middleware::from_fn(body_limit::limit_body))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(access_log::layer())
        .layer(CompressionLayer::new())
        .layer(cors(&state.config.frontend_url))
        .layer(axum::middleware::from_fn(security_headers::security_headers))
        .with_state(state.clone());

    let gateway = Gateway {
        registry,
        hub: state.realtime.clone(),
        verifier: state.verifier.clone(),
        allowed_origin: state.config.frontend_url.clone(),
    };
    let realtime = Router::new().route("/ws", get(ws::handle_ws)).with_state(gateway);

    api.merge(realtime)
}

/// Put a whole prefix behind the auth gate. The group's own 404 handling
/// sits inside the gate, so an anonymous caller gets 401 for every path
/// under the prefix, routed or not.
fn gated(state: &AppState, group: Router<AppState>) -> Router<AppState> {
    group
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_auth))
}

/// Single allowed origin with credentials. An unparseable origin allows
/// nothing rather than everything.
fn cors(frontend_url: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(frontend_url.trim_end_matches('/')).ok();
    if origin.is_none() {
        tracing::warn!(%frontend_url, "FRONTEND_URL is not a valid origin; cross-origin requests will be refused");
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origin))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Unmatched route or method: `Cannot <METHOD> <original url>`.
async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> Response {
    let target = uri.path_and_query().map_or_else(|| uri.path(), |pq| pq.as_str());
    json_error(StatusCode::NOT_FOUND, "Route not found", format!("Cannot {method} {target}"))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "handler panicked");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", "an unexpected error occurred")
}

// =============================================================================
// PAYLOAD EXTRACTOR
// =============================================================================

/// Request body as JSON, or URL-encoded form when the content type says so.
/// Rejections come back as `ApiError` JSON.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state).await?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state).await?;
            Ok(Self(value))
        }
    }
}

/// `axum::extract::Path` with a JSON rejection.
pub struct Path<T>(pub T);

impl<S, T> FromRequestParts<S> for Path<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Path(value) = axum::extract::Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `axum::extract::Query` with a JSON rejection.
pub struct Query<T>(pub T);

impl<S, T> FromRequestParts<S> for Query<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let axum::extract::Query(value) = axum::extract::Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
