//! Public marketplace. No session required; only `public` models show up.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Path, Query};
use crate::error::{ApiError, ErrorBody};
use crate::services::models::{self, Model};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MarketplaceQuery {
    /// Case-insensitive substring of name or description.
    pub q: Option<String>,
    /// Page size, 1-100 (default 20).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MarketplacePage {
    pub items: Vec<Model>,
    pub limit: i64,
    pub offset: i64,
}

/// `GET /api/marketplace`
#[utoipa::path(
    get, path = "/api/marketplace", tag = "marketplace",
    params(MarketplaceQuery),
    responses(
        (status = 200, description = "Public models", body = MarketplacePage),
        (status = 400, description = "Malformed query", body = ErrorBody),
    )
)]
pub async fn list_marketplace(
    State(state): State<AppState>,
    Query(query): Query<MarketplaceQuery>,
) -> Result<Json<MarketplacePage>, ApiError> {
    let (limit, offset) = models::page_bounds(query.limit, query.offset);
    let items = models::list_public(&state.pool, query.q.as_deref(), limit, offset).await?;
    Ok(Json(MarketplacePage { items, limit, offset }))
}

/// `GET /api/marketplace/{id}`
#[utoipa::path(
    get, path = "/api/marketplace/{id}", tag = "marketplace",
    params(("id" = Uuid, Path, description = "Model id")),
    responses(
        (status = 200, description = "Public model", body = Model),
        (status = 404, description = "Private or absent", body = ErrorBody),
    )
)]
pub async fn get_listing(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Model>, ApiError> {
    Ok(Json(models::get_public(&state.pool, id).await?))
}
