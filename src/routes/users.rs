//! Profile routes for the signed-in user.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::Payload;
use super::auth::AuthUser;
use crate::db::rfc3339;
use crate::error::{ApiError, ErrorBody};
use crate::services::account;
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub member_since: String,
    pub stats: UserStats,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserStats {
    pub models: i64,
    pub training_jobs: i64,
    pub deployments: i64,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ProfilePatch {
    pub name: String,
}

pub(crate) async fn load_profile(pool: &PgPool, user_id: Uuid) -> Result<UserProfile, ApiError> {
    let sql = format!(
        r"SELECT u.id, u.email, u.name, u.role, {},
                 (SELECT COUNT(*) FROM models m WHERE m.owner_id = u.id)        AS models,
                 (SELECT COUNT(*) FROM training_jobs t WHERE t.user_id = u.id)  AS training_jobs,
                 (SELECT COUNT(*) FROM deployments d WHERE d.user_id = u.id)    AS deployments
          FROM users u WHERE u.id = $1",
        rfc3339("created_at"),
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    Ok(UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role: row.get("role"),
        member_since: row.get("created_at"),
        stats: UserStats {
            models: row.get("models"),
            training_jobs: row.get("training_jobs"),
            deployments: row.get("deployments"),
        },
    })
}

/// `GET /api/users/me`: profile with aggregate counts.
#[utoipa::path(
    get, path = "/api/users/me", tag = "users",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "No session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> Result<Json<UserProfile>, ApiError> {
    Ok(Json(load_profile(&state.pool, auth.identity.user_id).await?))
}

/// `PATCH /api/users/me`: rename.
#[utoipa::path(
    patch, path = "/api/users/me", tag = "users",
    request_body = ProfilePatch,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid name", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Payload(patch): Payload<ProfilePatch>,
) -> Result<Json<UserProfile>, ApiError> {
    let name = account::normalize_name(&patch.name).ok_or_else(|| ApiError::from(account::AccountError::InvalidName))?;
    let user_id = auth.identity.user_id;

    sqlx::query("UPDATE users SET name = $2 WHERE id = $1")
        .bind(user_id)
        .bind(name)
        .execute(&state.pool)
        .await?;
    state.verifier.forget_user(user_id).await;

    Ok(Json(load_profile(&state.pool, user_id).await?))
}

#[cfg(all(test, feature = "live-db-tests"))]
mod tests {
    use super::*;
    use crate::services::models::{self, NewModel};
    use crate::state::test_helpers::{live_pool, live_user};

    #[tokio::test]
    async fn profile_counts_only_own_rows() {
        let pool = live_pool().await;
        let ada = live_user(&pool).await;
        let grace = live_user(&pool).await;
        let req = NewModel {
            name: "classifier".into(),
            description: String::new(),
            model_type: "classifier".into(),
            version: None,
            tags: None,
            visibility: None,
            price_cents: None,
        };
        models::create(&pool, ada, req.clone()).await.unwrap();
        models::create(&pool, ada, req.clone()).await.unwrap();
        models::create(&pool, grace, req).await.unwrap();

        let profile = load_profile(&pool, ada).await.unwrap();
        assert_eq!(profile.id, ada);
        assert_eq!(profile.stats.models, 2);
        assert_eq!(profile.stats.training_jobs, 0);
        assert_eq!(profile.stats.deployments, 0);
        assert!(profile.member_since.ends_with('Z'));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let pool = live_pool().await;
        assert!(matches!(load_profile(&pool, Uuid::new_v4()).await, Err(ApiError::NotFound(_))));
    }
}
