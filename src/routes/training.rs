//! Training job routes.
//!
//! Creating or cancelling a job also pushes a `training:update` event to the
//! caller's realtime connections that subscribed to training updates.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use uuid::Uuid;

use super::{Path, Payload};
use super::auth::AuthUser;
use crate::error::{ApiError, ErrorBody};
use crate::realtime::{Event, Topic};
use crate::services::training::{self, JobStatus, NewTrainingJob, TrainingJob};
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

async fn publish_update(state: &AppState, job: &TrainingJob) {
    let Ok(data) = serde_json::to_value(job) else { return };
    let delivered = state
        .realtime
        .publish(job.user_id, Topic::Training, Event::new("training:update", data))
        .await;
    tracing::debug!(job_id = %job.id, delivered, "training update published");
}

/// `POST /api/training`
#[utoipa::path(
    post, path = "/api/training", tag = "training",
    request_body = NewTrainingJob,
    responses(
        (status = 201, description = "Job queued", body = JobAccepted),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Referenced model not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn create_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Payload(req): Payload<NewTrainingJob>,
) -> Result<impl IntoResponse, ApiError> {
    let job = training::create_job(&state.pool, auth.identity.user_id, req).await?;
    tracing::info!(job_id = %job.id, user_id = %job.user_id, model_type = %job.model_type, "training job queued");
    publish_update(&state, &job).await;

    let body = JobAccepted { job_id: job.id, status: job.status, message: "Training job queued".into() };
    Ok((StatusCode::CREATED, Json(body)))
}

/// `GET /api/training`
#[utoipa::path(
    get, path = "/api/training", tag = "training",
    responses((status = 200, description = "Caller's jobs", body = [TrainingJob])),
    security(("bearer" = []))
)]
pub async fn list_jobs(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<TrainingJob>>, ApiError> {
    Ok(Json(training::list_jobs(&state.pool, auth.identity.user_id).await?))
}

/// `GET /api/training/{id}`
#[utoipa::path(
    get, path = "/api/training/{id}", tag = "training",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job status", body = TrainingJob),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TrainingJob>, ApiError> {
    Ok(Json(training::get_job(&state.pool, auth.identity.user_id, id).await?))
}

/// `POST /api/training/{id}/cancel`
#[utoipa::path(
    post, path = "/api/training/{id}/cancel", tag = "training",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job cancelled", body = TrainingJob),
        (status = 404, description = "Not the caller's or absent", body = ErrorBody),
        (status = 409, description = "Job already finished", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TrainingJob>, ApiError> {
    let job = training::cancel_job(&state.pool, auth.identity.user_id, id).await?;
    tracing::info!(job_id = %job.id, "training job cancelled");
    publish_update(&state, &job).await;
    Ok(Json(job))
}
