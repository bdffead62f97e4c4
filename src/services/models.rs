//! Model catalog: owner-scoped CRUD plus the public marketplace view.
//!
//! A model row is metadata only (name, type, version, tags, price). Owner
//! routes see every model the caller owns; the marketplace sees rows with
//! `visibility = 'public'` and nothing else.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::rfc3339;

const MAX_NAME_LEN: usize = 100;
const MAX_TAGS: usize = 20;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct Model {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub model_type: String,
    pub version: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub price_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct NewModel {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_type: String,
    pub version: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub price_cents: Option<i64>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct ModelPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    pub price_cents: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{0}")]
    Invalid(String),
    #[error("model not found")]
    NotFound,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

static MODEL_COLUMNS: LazyLock<String> = LazyLock::new(|| {
    format!(
        "id, owner_id, name, description, model_type, version, tags, visibility, price_cents, {}, {}",
        rfc3339("created_at"),
        rfc3339("updated_at"),
    )
});

fn model_from_row(r: &PgRow) -> Model {
    Model {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        name: r.get("name"),
        description: r.get("description"),
        model_type: r.get("model_type"),
        version: r.get("version"),
        tags: r.get("tags"),
        visibility: r.get("visibility"),
        price_cents: r.get("price_cents"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn check_name(name: &str) -> Result<String, ModelError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ModelError::Invalid(format!("name must be 1-{MAX_NAME_LEN} characters")));
    }
    Ok(name.to_owned())
}

fn check_tags(tags: Vec<String>) -> Result<Vec<String>, ModelError> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.len() > MAX_TAGS {
        return Err(ModelError::Invalid(format!("at most {MAX_TAGS} tags allowed")));
    }
    Ok(tags)
}

fn check_price(price_cents: i64) -> Result<i64, ModelError> {
    if price_cents < 0 {
        return Err(ModelError::Invalid("price_cents must not be negative".into()));
    }
    Ok(price_cents)
}

/// Clamp marketplace paging to `1..=MAX_PAGE_SIZE` and a non-negative offset.
#[must_use]
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// `ILIKE` pattern matching `q` anywhere, with wildcards in `q` escaped.
#[must_use]
pub fn search_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// OWNER QUERIES
// =============================================================================

pub async fn list_owned(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Model>, ModelError> {
    let sql = format!("SELECT {} FROM models WHERE owner_id = $1 ORDER BY created_at DESC", *MODEL_COLUMNS);
    let rows = sqlx::query(&sql).bind(owner_id).fetch_all(pool).await?;
    Ok(rows.iter().map(model_from_row).collect())
}

pub async fn create(pool: &PgPool, owner_id: Uuid, req: NewModel) -> Result<Model, ModelError> {
    let name = check_name(&req.name)?;
    let model_type = req.model_type.trim();
    if model_type.is_empty() {
        return Err(ModelError::Invalid("model_type is required".into()));
    }
    let tags = check_tags(req.tags.unwrap_or_default())?;
    let price_cents = check_price(req.price_cents.unwrap_or(0))?;
    let version = req
        .version
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "1.0.0".to_owned());

    let sql = format!(
        "INSERT INTO models (id, owner_id, name, description, model_type, version, tags, visibility, price_cents)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {}",
        *MODEL_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(name)
        .bind(req.description.trim())
        .bind(model_type)
        .bind(version)
        .bind(tags)
        .bind(req.visibility.unwrap_or_default())
        .bind(price_cents)
        .fetch_one(pool)
        .await?;
    Ok(model_from_row(&row))
}

pub async fn get_owned(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<Model, ModelError> {
    let sql = format!("SELECT {} FROM models WHERE id = $1 AND owner_id = $2", *MODEL_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ModelError::NotFound)?;
    Ok(model_from_row(&row))
}

pub async fn update(pool: &PgPool, owner_id: Uuid, id: Uuid, patch: ModelPatch) -> Result<Model, ModelError> {
    let name = patch.name.as_deref().map(check_name).transpose()?;
    let tags = patch.tags.map(check_tags).transpose()?;
    let price_cents = patch.price_cents.map(check_price).transpose()?;

    let sql = format!(
        "UPDATE models SET
             name = COALESCE($3, name),
             description = COALESCE($4, description),
             version = COALESCE($5, version),
             tags = COALESCE($6, tags),
             visibility = COALESCE($7, visibility),
             price_cents = COALESCE($8, price_cents),
             updated_at = now()
         WHERE id = $1 AND owner_id = $2
         RETURNING {}",
        *MODEL_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(owner_id)
        .bind(name)
        .bind(patch.description.map(|d| d.trim().to_owned()))
        .bind(patch.version.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()))
        .bind(tags)
        .bind(patch.visibility)
        .bind(price_cents)
        .fetch_optional(pool)
        .await?
        .ok_or(ModelError::NotFound)?;
    Ok(model_from_row(&row))
}

pub async fn delete(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<(), ModelError> {
    let result = sqlx::query("DELETE FROM models WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ModelError::NotFound);
    }
    Ok(())
}

// =============================================================================
// MARKETPLACE QUERIES
// =============================================================================

pub async fn list_public(pool: &PgPool, q: Option<&str>, limit: i64, offset: i64) -> Result<Vec<Model>, ModelError> {
    let pattern = q.map(str::trim).filter(|q| !q.is_empty()).map(search_pattern);
    let sql = format!(
        "SELECT {} FROM models
         WHERE visibility = 'public'
           AND ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3",
        *MODEL_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(model_from_row).collect())
}

pub async fn get_public(pool: &PgPool, id: Uuid) -> Result<Model, ModelError> {
    let sql = format!("SELECT {} FROM models WHERE id = $1 AND visibility = 'public'", *MODEL_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(ModelError::NotFound)?;
    Ok(model_from_row(&row))
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
