//! Usage summary for the signed-in user.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

const JOB_STATUSES: [&str; 5] = ["queued", "running", "completed", "failed", "cancelled"];

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AnalyticsSummary {
    pub models: ModelCounts,
    /// Job count per status; every status is present, zero if unused.
    pub training_jobs: BTreeMap<String, i64>,
    pub active_deployments: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ModelCounts {
    pub total: i64,
    pub public: i64,
}

/// Fold `(status, count)` rows into a map with every known status present.
pub(crate) fn job_counts(rows: impl IntoIterator<Item = (String, i64)>) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> = JOB_STATUSES.iter().map(|s| ((*s).to_owned(), 0)).collect();
    for (status, count) in rows {
        *counts.entry(status).or_insert(0) += count;
    }
    counts
}

/// `GET /api/analytics`
#[utoipa::path(
    get, path = "/api/analytics", tag = "analytics",
    responses(
        (status = 200, description = "Usage summary", body = AnalyticsSummary),
        (status = 401, description = "No session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn summary(State(state): State<AppState>, auth: AuthUser) -> Result<Json<AnalyticsSummary>, ApiError> {
    Ok(Json(load_summary(&state.pool, auth.identity.user_id).await?))
}

pub(crate) async fn load_summary(pool: &PgPool, user_id: Uuid) -> Result<AnalyticsSummary, sqlx::Error> {
    let totals = sqlx::query(
        r"SELECT
              (SELECT COUNT(*) FROM models WHERE owner_id = $1)                               AS models_total,
              (SELECT COUNT(*) FROM models WHERE owner_id = $1 AND visibility = 'public')     AS models_public,
              (SELECT COUNT(*) FROM deployments
                WHERE user_id = $1 AND status IN ('pending', 'active'))                       AS deployments_active",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let job_rows = sqlx::query("SELECT status, COUNT(*) AS n FROM training_jobs WHERE user_id = $1 GROUP BY status")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(AnalyticsSummary {
        models: ModelCounts { total: totals.get("models_total"), public: totals.get("models_public") },
        training_jobs: job_counts(job_rows.iter().map(|r| (r.get("status"), r.get("n")))),
        active_deployments: totals.get("deployments_active"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_counts_fills_missing_statuses() {
        let counts = job_counts(vec![("running".to_owned(), 2), ("failed".to_owned(), 1)]);
        assert_eq!(counts.len(), 5);
        assert_eq!(counts["running"], 2);
        assert_eq!(counts["failed"], 1);
        assert_eq!(counts["queued"], 0);
    }

    #[test]
    fn job_counts_empty() {
        assert!(job_counts(Vec::new()).values().all(|&n| n == 0));
    }

    #[cfg(feature = "live-db-tests")]
    mod live {
        use super::*;
        use crate::services::deployment::{self, NewDeployment};
        use crate::services::models::{self, NewModel, Visibility};
        use crate::services::training::{self, NewTrainingJob};
        use crate::state::test_helpers::{live_pool, live_user};

        fn job() -> NewTrainingJob {
            NewTrainingJob {
                model_type: "classifier".into(),
                dataset_path: "s3://datasets/iris.csv".into(),
                model_id: None,
                hyperparameters: None,
                training_config: None,
            }
        }

        #[tokio::test]
        async fn summary_counts_by_status() {
            let pool = live_pool().await;
            let user = live_user(&pool).await;

            let model = models::create(
                &pool,
                user,
                NewModel {
                    name: "public-one".into(),
                    description: String::new(),
                    model_type: "classifier".into(),
                    version: None,
                    tags: None,
                    visibility: Some(Visibility::Public),
                    price_cents: None,
                },
            )
            .await
            .unwrap();

            training::create_job(&pool, user, job()).await.unwrap();
            let cancelled = training::create_job(&pool, user, job()).await.unwrap();
            training::cancel_job(&pool, user, cancelled.id).await.unwrap();

            let live = NewDeployment { model_id: model.id, replicas: None };
            deployment::create(&pool, user, "http://localhost:8000", live.clone()).await.unwrap();
            let stopped = deployment::create(&pool, user, "http://localhost:8000", live).await.unwrap();
            deployment::stop(&pool, user, stopped.id).await.unwrap();

            let summary = load_summary(&pool, user).await.unwrap();
            assert_eq!(summary.models.total, 1);
            assert_eq!(summary.models.public, 1);
            assert_eq!(summary.training_jobs["queued"], 1);
            assert_eq!(summary.training_jobs["cancelled"], 1);
            assert_eq!(summary.training_jobs["running"], 0);
            assert_eq!(summary.active_deployments, 1);
        }
    }
}
