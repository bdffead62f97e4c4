//! Training job records.
//!
//! Jobs are bookkeeping only: the API records a request, reports its status
//! and lets the owner cancel it. Whatever executes jobs updates `status` and
//! `progress` out of band.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses never change again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TrainingJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model_id: Option<Uuid>,
    pub model_type: String,
    pub dataset_path: String,
    #[schema(value_type = Object)]
    pub hyperparameters: serde_json::Value,
    #[schema(value_type = Object)]
    pub training_config: serde_json::Value,
    pub status: JobStatus,
    pub progress: f32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct NewTrainingJob {
    pub model_type: String,
    pub dataset_path: String,
    pub model_id: Option<Uuid>,
    #[schema(value_type = Option<Object>)]
    pub hyperparameters: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub training_config: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("{0}")]
    Invalid(String),
    #[error("training job not found")]
    NotFound,
    #[error("model not found")]
    ModelNotFound,
    #[error("job is already {}", .0.as_str())]
    NotCancellable(JobStatus),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

static JOB_COLUMNS: LazyLock<String> = LazyLock::new(|| {
    format!(
        "id, user_id, model_id, model_type, dataset_path, hyperparameters, training_config, status, progress, {}, {}",
        rfc3339("created_at"),
        rfc3339("updated_at"),
    )
});

fn job_from_row(r: &PgRow) -> TrainingJob {
    TrainingJob {
        id: r.get("id"),
        user_id: r.get("user_id"),
        model_id: r.get("model_id"),
        model_type: r.get("model_type"),
        dataset_path: r.get("dataset_path"),
        hyperparameters: r.get("hyperparameters"),
        training_config: r.get("training_config"),
        status: r.get("status"),
        progress: r.get("progress"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

/// Validate a job request without touching the database.
pub(crate) fn validate(req: &NewTrainingJob) -> Result<(), TrainingError> {
    if req.model_type.trim().is_empty() || req.dataset_path.trim().is_empty() {
        return Err(TrainingError::Invalid("model_type and dataset_path are required".into()));
    }
    for (field, value) in [("hyperparameters", &req.hyperparameters), ("training_config", &req.training_config)] {
        if value.as_ref().is_some_and(|v| !v.is_object()) {
            return Err(TrainingError::Invalid(format!("{field} must be an object")));
        }
    }
    Ok(())
}

/// Record a new queued job for `user_id`.
pub async fn create_job(pool: &PgPool, user_id: Uuid, req: NewTrainingJob) -> Result<TrainingJob, TrainingError> {
    validate(&req)?;

    if let Some(model_id) = req.model_id {
        let owned: Option<i32> = sqlx::query_scalar("SELECT 1 FROM models WHERE id = $1 AND owner_id = $2")
            .bind(model_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        if owned.is_none() {
            return Err(TrainingError::ModelNotFound);
        }
    }

    let sql = format!(
        "INSERT INTO training_jobs (id, user_id, model_id, model_type, dataset_path, hyperparameters, training_config)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {}",
        *JOB_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.model_id)
        .bind(req.model_type.trim())
        .bind(req.dataset_path.trim())
        .bind(req.hyperparameters.unwrap_or_else(|| serde_json::json!({})))
        .bind(req.training_config.unwrap_or_else(|| serde_json::json!({})))
        .fetch_one(pool)
        .await?;

    Ok(job_from_row(&row))
}

pub async fn list_jobs(pool: &PgPool, user_id: Uuid) -> Result<Vec<TrainingJob>, TrainingError> {
    let sql = format!(
        "SELECT {} FROM training_jobs WHERE user_id = $1 ORDER BY created_at DESC",
        *JOB_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().map(job_from_row).collect())
}

pub async fn get_job(pool: &PgPool, user_id: Uuid, job_id: Uuid) -> Result<TrainingJob, TrainingError> {
    let sql = format!("SELECT {} FROM training_jobs WHERE id = $1 AND user_id = $2", *JOB_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(TrainingError::NotFound)?;
    Ok(job_from_row(&row))
}

/// Move a queued or running job to `cancelled`.
pub async fn cancel_job(pool: &PgPool, user_id: Uuid, job_id: Uuid) -> Result<TrainingJob, TrainingError> {
    let sql = format!(
        "UPDATE training_jobs SET status = 'cancelled', updated_at = now()
         WHERE id = $1 AND user_id = $2 AND status IN ('queued', 'running')
         RETURNING {}",
        *JOB_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(job_from_row(&row)),
        // Either not ours, or already terminal; tell the two apart.
        None => {
            let job = get_job(pool, user_id, job_id).await?;
            Err(TrainingError::NotCancellable(job.status))
        }
    }
}

#[cfg(test)]
#[path = "training_test.rs"]
mod tests;
