//! Account registration and password login.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::auth::Identity;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 72;
const MAX_NAME_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("name must be 1-{} characters", MAX_NAME_LEN)]
    InvalidName,
    #[error("password must be {}-{} characters", MIN_PASSWORD_LEN, MAX_PASSWORD_LEN)]
    WeakPassword,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is deactivated")]
    Deactivated,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return None;
    }
    Some(trimmed.to_owned())
}

fn check_password(password: &str) -> Result<(), AccountError> {
    // bcrypt only reads the first 72 bytes.
    if password.chars().count() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(AccountError::WeakPassword);
    }
    Ok(())
}

/// bcrypt is deliberately slow; keep it off the async workers.
async fn hash_password(password: String) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AccountError::Hash(e.to_string()))?
        .map_err(|e| AccountError::Hash(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AccountError::Hash(e.to_string()))?
        .map_err(|e| AccountError::Hash(e.to_string()))
}

/// Create a user account. Returns the new identity.
pub async fn register(pool: &PgPool, email: &str, name: &str, password: &str) -> Result<Identity, AccountError> {
    let email = normalize_email(email).ok_or(AccountError::InvalidEmail)?;
    let name = normalize_name(name).ok_or(AccountError::InvalidName)?;
    check_password(password)?;

    let password_hash = hash_password(password.to_owned()).await?;
    let user_id = Uuid::new_v4();

    let row = sqlx::query(
        r"INSERT INTO users (id, email, name, password_hash)
          VALUES ($1, $2, $3, $4)
          ON CONFLICT (email) DO NOTHING
          RETURNING role, active",
    )
    .bind(user_id)
    .bind(&email)
    .bind(&name)
    .bind(password_hash)
    .fetch_optional(pool)
    .await?
    .ok_or(AccountError::EmailTaken)?;

    Ok(Identity { user_id, email, name, role: row.get("role"), active: row.get("active") })
}

/// Check an email/password pair.
pub async fn login(pool: &PgPool, email: &str, password: &str) -> Result<Identity, AccountError> {
    let email = normalize_email(email).ok_or(AccountError::InvalidCredentials)?;

    let row = sqlx::query("SELECT id, email, name, role, active, password_hash FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool)
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

    if !verify_password(password.to_owned(), row.get("password_hash")).await? {
        return Err(AccountError::InvalidCredentials);
    }

    let identity = Identity {
        user_id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role: row.get("role"),
        active: row.get("active"),
    };
    if !identity.active {
        return Err(AccountError::Deactivated);
    }
    Ok(identity)
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
