use axum::Router;
use axum::body::Body;
use axum::http::{Method, header};
use axum::routing::get;
use tower::ServiceExt;

use super::*;
use crate::state::test_helpers::{self, INACTIVE_TOKEN, VALID_TOKEN};

fn gated(state: AppState) -> Router {
    Router::new()
        .route("/whoami", get(|auth: AuthUser| async move { auth.identity.email }))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

fn request(auth: Option<&str>) -> Request {
    let mut builder = axum::http::Request::builder().method(Method::GET).uri("/whoami");
    if let Some(value) = auth {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

// =============================================================================
// require_auth
// =============================================================================

#[tokio::test]
async fn gate_rejects_missing_credential() {
    let response = gated(test_helpers::test_app_state()).oneshot(request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gate_rejects_unknown_token() {
    let response = gated(test_helpers::test_app_state())
        .oneshot(request(Some("Bearer nope")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gate_rejects_deactivated_account() {
    let response = gated(test_helpers::test_app_state())
        .oneshot(request(Some(&format!("Bearer {INACTIVE_TOKEN}"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn gate_forwards_identity() {
    let response = gated(test_helpers::test_app_state())
        .oneshot(request(Some(&format!("Bearer {VALID_TOKEN}"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ada@example.com");
}

#[tokio::test]
async fn gate_accepts_session_cookie() {
    let req = axum::http::Request::builder()
        .uri("/whoami")
        .header(header::COOKIE, format!("{COOKIE_NAME}={VALID_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = gated(test_helpers::test_app_state()).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// AuthUser without the gate
// =============================================================================

#[tokio::test]
async fn me_resolves_token_itself() {
    let state = test_helpers::test_app_state();
    let app = Router::new().route("/me", get(me)).with_state(state);
    let req = axum::http::Request::builder()
        .uri("/me")
        .header(header::AUTHORIZATION, format!("Bearer {VALID_TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let identity: Identity = serde_json::from_slice(&body).unwrap();
    assert!(identity.active);
}

#[tokio::test]
async fn me_without_session_is_unauthorized_json() {
    let app = Router::new().route("/me", get(me)).with_state(test_helpers::test_app_state());
    let response = app
        .oneshot(axum::http::Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["error"], "Unauthorized");
}

// =============================================================================
// cookies
// =============================================================================

#[tokio::test]
async fn session_cookie_is_http_only_and_scoped() {
    let state = test_helpers::test_app_state();
    let cookie = session_cookie(&state, "abc".into(), Duration::days(SESSION_MAX_AGE_DAYS));
    assert_eq!(cookie.name(), COOKIE_NAME);
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.secure(), Some(false));
}

#[tokio::test]
async fn session_cookie_is_secure_in_production() {
    let mut config = crate::config::Config::default();
    config.environment = "production".into();
    let state = test_helpers::test_app_state_with(config);
    let cookie = session_cookie(&state, "abc".into(), Duration::ZERO);
    assert_eq!(cookie.secure(), Some(true));
}
