//! Credential verification behind the auth gate.
//!
//! DESIGN
//! ======
//! The gate only knows `TokenVerifier`: hand it a token, get back an
//! `Identity` or nothing. `PgSessionVerifier` resolves tokens against the
//! `sessions` table and keeps positive results in Redis for a minute so hot
//! clients do not hit Postgres on every request. Every cached entry is also
//! listed in a per-user set, so a profile change can evict all of that
//! user's sessions at once. Cache trouble is logged and skipped; Postgres
//! stays the source of truth.

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::session;
use crate::cache::Cache;

const IDENTITY_CACHE_TTL_SECS: u64 = 60;

/// Authenticated caller attached to a request by the auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    /// Deactivated accounts still authenticate but are refused with 403.
    pub active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a token. `Ok(None)` means unknown or expired.
    async fn verify(&self, token: &str) -> Result<Option<Identity>, AuthError>;

    /// Drop anything remembered about a token that was just revoked.
    async fn forget(&self, _token: &str) {}

    /// Drop everything remembered about a user's sessions, e.g. after the
    /// user's profile changed.
    async fn forget_user(&self, _user_id: Uuid) {}
}

pub struct PgSessionVerifier {
    pool: PgPool,
    cache: Option<Cache>,
}

impl PgSessionVerifier {
    #[must_use]
    pub fn new(pool: PgPool, cache: Option<Cache>) -> Self {
        Self { pool, cache }
    }

    async fn cached(&self, key: &str) -> Option<Identity> {
        let mut conn = self.cache.as_ref()?.connection();
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "session cache read failed");
                return None;
            }
        };
        raw.and_then(|json| serde_json::from_str(&json).ok())
    }

    async fn remember(&self, key: &str, identity: &Identity) {
        let Some(cache) = &self.cache else { return };
        let Ok(json) = serde_json::to_string(identity) else { return };
        let user_key = user_cache_key(identity.user_id);
        let mut conn = cache.connection();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(key, json, IDENTITY_CACHE_TTL_SECS)
            .ignore()
            .sadd(&user_key, key)
            .ignore()
            .cmd("EXPIRE")
            .arg(&user_key)
            .arg(IDENTITY_CACHE_TTL_SECS)
            .ignore();
        let written: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = written {
            warn!(error = %e, "session cache write failed");
        }
    }
}

fn cache_key(token: &str) -> String {
    format!("session:{}", session::hash_token(token))
}

/// Set of `cache_key`s currently cached for one user.
fn user_cache_key(user_id: Uuid) -> String {
    format!("session-user:{user_id}")
}

#[async_trait]
impl TokenVerifier for PgSessionVerifier {
    async fn verify(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let key = cache_key(token);
        if let Some(identity) = self.cached(&key).await {
            return Ok(Some(identity));
        }

        let identity = session::find_identity(&self.pool, token).await?;
        if let Some(identity) = &identity {
            self.remember(&key, identity).await;
        }
        Ok(identity)
    }

    async fn forget(&self, token: &str) {
        let Some(cache) = &self.cache else { return };
        let mut conn = cache.connection();
        if let Err(e) = conn.del::<_, ()>(cache_key(token)).await {
            warn!(error = %e, "session cache eviction failed");
        }
    }

    async fn forget_user(&self, user_id: Uuid) {
        let Some(cache) = &self.cache else { return };
        let user_key = user_cache_key(user_id);
        let mut conn = cache.connection();
        let keys: Vec<String> = match conn.smembers(&user_key).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, %user_id, "session cache lookup failed");
                return;
            }
        };

        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.del(key).ignore();
        }
        pipe.del(&user_key).ignore();
        let evicted: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        if let Err(e) = evicted {
            warn!(error = %e, %user_id, "session cache eviction failed");
        }
    }
}

/// Pull a session token from `Authorization: Bearer` or the session cookie.
#[must_use]
pub fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim().to_owned())
        })
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    let jar = axum_extra::extract::cookie::CookieJar::from_headers(headers);
    jar.get(crate::routes::auth::COOKIE_NAME)
        .map(|c| c.value().to_owned())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
