//! Model registry routes. Every handler is scoped to the caller's models.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use super::{Path, Payload};
use super::auth::AuthUser;
use crate::error::{ApiError, ErrorBody};
use crate::services::models::{self, Model, ModelPatch, NewModel};
use crate::state::AppState;

/// `GET /api/models`
#[utoipa::path(
    get, path = "/api/models", tag = "models",
    responses(
        (status = 200, description = "Caller's models", body = [Model]),
        (status = 401, description = "No session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn list_models(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Model>>, ApiError> {
    Ok(Json(models::list_owned(&state.pool, auth.identity.user_id).await?))
}

/// `POST /api/models`
#[utoipa::path(
    post, path = "/api/models", tag = "models",
    request_body = NewModel,
    responses(
        (status = 201, description = "Model registered", body = Model),
        (status = 400, description = "Invalid input", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_model(
    State(state): State<AppState>,
    auth: AuthUser,
    Payload(req): Payload<NewModel>,
) -> Result<impl IntoResponse, ApiError> {
    let model = models::create(&state.pool, auth.identity.user_id, req).await?;
    tracing::info!(model_id = %model.id, user_id = %auth.identity.user_id, "model registered");
    Ok((StatusCode::CREATED, Json(model)))
}

/// `GET /api/models/{id}`
#[utoipa::path(
    get, path = "/api/models/{id}", tag = "models",
    params(("id" = Uuid, Path, description = "Model id")),
    responses(
        (status = 200, description = "Model", body = Model),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_model(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Model>, ApiError> {
    Ok(Json(models::get_owned(&state.pool, auth.identity.user_id, id).await?))
}

/// `PATCH /api/models/{id}`
#[utoipa::path(
    patch, path = "/api/models/{id}", tag = "models",
    params(("id" = Uuid, Path, description = "Model id")),
    request_body = ModelPatch,
    responses(
        (status = 200, description = "Updated model", body = Model),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_model(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Payload(patch): Payload<ModelPatch>,
) -> Result<Json<Model>, ApiError> {
    Ok(Json(models::update(&state.pool, auth.identity.user_id, id, patch).await?))
}

/// `DELETE /api/models/{id}`
#[utoipa::path(
    delete, path = "/api/models/{id}", tag = "models",
    params(("id" = Uuid, Path, description = "Model id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn delete_model(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    models::delete(&state.pool, auth.identity.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
