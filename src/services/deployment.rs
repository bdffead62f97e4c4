//! Deployment records.
//!
//! Like training jobs, a deployment is a record of intent: the API stores
//! the requested replica count and an endpoint URL, and `stopped` is the
//! only transition it performs itself.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::rfc3339;

pub const MIN_REPLICAS: i32 = 1;
pub const MAX_REPLICAS: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Deployment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model_id: Uuid,
    pub status: DeploymentStatus,
    pub replicas: i32,
    pub endpoint: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct NewDeployment {
    pub model_id: Uuid,
    pub replicas: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeploymentError {
    #[error("replicas must be between {} and {}", MIN_REPLICAS, MAX_REPLICAS)]
    InvalidReplicas,
    #[error("model not found")]
    ModelNotFound,
    #[error("deployment not found")]
    NotFound,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

static DEPLOYMENT_COLUMNS: LazyLock<String> = LazyLock::new(|| {
    format!(
        "id, user_id, model_id, status, replicas, endpoint, {}, {}",
        rfc3339("created_at"),
        rfc3339("updated_at"),
    )
});

fn deployment_from_row(r: &PgRow) -> Deployment {
    Deployment {
        id: r.get("id"),
        user_id: r.get("user_id"),
        model_id: r.get("model_id"),
        status: r.get("status"),
        replicas: r.get("replicas"),
        endpoint: r.get("endpoint"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

pub(crate) fn check_replicas(replicas: Option<i32>) -> Result<i32, DeploymentError> {
    let replicas = replicas.unwrap_or(MIN_REPLICAS);
    if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&replicas) {
        return Err(DeploymentError::InvalidReplicas);
    }
    Ok(replicas)
}

/// Public URL a deployment would serve predictions from.
#[must_use]
pub fn endpoint_url(api_url: &str, id: Uuid) -> String {
    format!("{}/api/deployment/{id}/predict", api_url.trim_end_matches('/'))
}

/// Record a `pending` deployment of one of the caller's models.
pub async fn create(pool: &PgPool, user_id: Uuid, api_url: &str, req: NewDeployment) -> Result<Deployment, DeploymentError> {
    let replicas = check_replicas(req.replicas)?;

    let owned: Option<i32> = sqlx::query_scalar("SELECT 1 FROM models WHERE id = $1 AND owner_id = $2")
        .bind(req.model_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if owned.is_none() {
        return Err(DeploymentError::ModelNotFound);
    }

    let id = Uuid::new_v4();
    let sql = format!(
        "INSERT INTO deployments (id, user_id, model_id, replicas, endpoint)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {}",
        *DEPLOYMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .bind(req.model_id)
        .bind(replicas)
        .bind(endpoint_url(api_url, id))
        .fetch_one(pool)
        .await?;
    Ok(deployment_from_row(&row))
}

pub async fn list(pool: &PgPool, user_id: Uuid) -> Result<Vec<Deployment>, DeploymentError> {
    let sql = format!(
        "SELECT {} FROM deployments WHERE user_id = $1 ORDER BY created_at DESC",
        *DEPLOYMENT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().map(deployment_from_row).collect())
}

pub async fn get(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<Deployment, DeploymentError> {
    let sql = format!("SELECT {} FROM deployments WHERE id = $1 AND user_id = $2", *DEPLOYMENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DeploymentError::NotFound)?;
    Ok(deployment_from_row(&row))
}

/// Mark a deployment `stopped`. Stopping twice is harmless.
pub async fn stop(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<Deployment, DeploymentError> {
    let sql = format!(
        "UPDATE deployments SET status = 'stopped', updated_at = now()
         WHERE id = $1 AND user_id = $2
         RETURNING {}",
        *DEPLOYMENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DeploymentError::NotFound)?;
    Ok(deployment_from_row(&row))
}
