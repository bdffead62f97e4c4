//! Deployment routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use super::{Path, Payload};
use super::auth::AuthUser;
use crate::error::{ApiError, ErrorBody};
use crate::services::deployment::{self, Deployment, NewDeployment};
use crate::state::AppState;

/// `POST /api/deployment`
#[utoipa::path(
    post, path = "/api/deployment", tag = "deployment",
    request_body = NewDeployment,
    responses(
        (status = 201, description = "Deployment recorded", body = Deployment),
        (status = 400, description = "Replicas out of range", body = ErrorBody),
        (status = 404, description = "Model not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Payload(req): Payload<NewDeployment>,
) -> Result<impl IntoResponse, ApiError> {
    let created = deployment::create(&state.pool, auth.identity.user_id, &state.config.api_url, req).await?;
    tracing::info!(deployment_id = %created.id, model_id = %created.model_id, replicas = created.replicas, "deployment recorded");
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/deployment`
#[utoipa::path(
    get, path = "/api/deployment", tag = "deployment",
    responses((status = 200, description = "Caller's deployments", body = [Deployment])),
    security(("bearer" = []))
)]
pub async fn list_deployments(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Deployment>>, ApiError> {
    Ok(Json(deployment::list(&state.pool, auth.identity.user_id).await?))
}

/// `GET /api/deployment/{id}`
#[utoipa::path(
    get, path = "/api/deployment/{id}", tag = "deployment",
    params(("id" = Uuid, Path, description = "Deployment id")),
    responses(
        (status = 200, description = "Deployment", body = Deployment),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Deployment>, ApiError> {
    Ok(Json(deployment::get(&state.pool, auth.identity.user_id, id).await?))
}

/// `DELETE /api/deployment/{id}`: mark stopped; the record is kept.
#[utoipa::path(
    delete, path = "/api/deployment/{id}", tag = "deployment",
    params(("id" = Uuid, Path, description = "Deployment id")),
    responses(
        (status = 200, description = "Stopped deployment", body = Deployment),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn stop_deployment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Deployment>, ApiError> {
    Ok(Json(deployment::stop(&state.pool, auth.identity.user_id, id).await?))
}
