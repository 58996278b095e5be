//! User accounts and the interaction log.
//!
//! Passwords are stored as `hex(sha256(salt || password))` with a random
//! per-user salt. Interactions are an append-only set keyed by
//! (user, item, kind); recording one twice changes nothing.

use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::UserError;
use crate::models::{format_ts_iso, Interaction, InteractionKind, User};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: String,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares every byte regardless of where the first difference is.
fn digests_match(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn row_to_user(row: &SqliteRow) -> User {
    let created_at: i64 = row.get("created_at");
    let last_login: Option<i64> = row.get("last_login");
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        bio: row.get("bio"),
        created_at: format_ts_iso(created_at),
        last_login: last_login.map(format_ts_iso),
    }
}

pub async fn register(pool: &SqlitePool, new: &NewUser) -> Result<User, UserError> {
    let username = new.username.trim();
    let email = new.email.trim();
    if username.is_empty() {
        return Err(UserError::MissingField("username"));
    }
    if email.is_empty() {
        return Err(UserError::MissingField("email"));
    }
    if new.password.is_empty() {
        return Err(UserError::MissingField("password"));
    }

    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(username)
        .fetch_one(pool)
        .await?;
    if taken > 0 {
        return Err(UserError::DuplicateUsername(username.to_string()));
    }
    let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;
    if taken > 0 {
        return Err(UserError::DuplicateEmail(email.to_string()));
    }

    let salt = uuid::Uuid::new_v4().simple().to_string();
    let hash = hash_password(&salt, &new.password);
    let now = chrono::Utc::now().timestamp();

    let id = sqlx::query(
        "INSERT INTO users (username, email, password_salt, password_hash, bio, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(email)
    .bind(&salt)
    .bind(&hash)
    .bind(&new.bio)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| insert_error(e, username, email))?
    .last_insert_rowid();

    get_user(pool, id).await?.ok_or(UserError::UnknownUser(id))
}

/// A registration racing past the pre-checks still trips a UNIQUE
/// constraint; report it as the duplicate it is.
fn insert_error(err: sqlx::Error, username: &str, email: &str) -> UserError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return if db_err.message().contains("users.email") {
                UserError::DuplicateEmail(email.to_string())
            } else {
                UserError::DuplicateUsername(username.to_string())
            };
        }
    }
    UserError::Db(err)
}

/// Verify credentials and stamp `last_login`.
pub async fn login(pool: &SqlitePool, username: &str, password: &str) -> Result<User, UserError> {
    let row = sqlx::query("SELECT id, password_salt, password_hash FROM users WHERE username = ?")
        .bind(username.trim())
        .fetch_optional(pool)
        .await?
        .ok_or(UserError::InvalidCredentials)?;

    let id: i64 = row.get("id");
    let salt: String = row.get("password_salt");
    let stored: String = row.get("password_hash");

    if !digests_match(&hash_password(&salt, password), &stored) {
        return Err(UserError::InvalidCredentials);
    }

    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;

    get_user(pool, id).await?.ok_or(UserError::UnknownUser(id))
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, UserError> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_user))
}

pub async fn list_user_ids(pool: &SqlitePool) -> Result<Vec<i64>, UserError> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Record an interaction. Returns `false` when it was already present.
pub async fn record_interaction(
    pool: &SqlitePool,
    interaction: &Interaction,
) -> Result<bool, UserError> {
    if get_user(pool, interaction.user_id).await?.is_none() {
        return Err(UserError::UnknownUser(interaction.user_id));
    }

    let result = sqlx::query(
        "INSERT OR IGNORE INTO interactions (user_id, bvid, kind, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(interaction.user_id)
    .bind(&interaction.bvid)
    .bind(interaction.kind.as_str())
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Every recorded interaction. Rows with an unknown kind are skipped.
pub async fn list_interactions(pool: &SqlitePool) -> Result<Vec<Interaction>, UserError> {
    let rows = sqlx::query("SELECT user_id, bvid, kind, created_at FROM interactions ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let kind: String = row.get("kind");
            let created_at: i64 = row.get("created_at");
            Some(Interaction {
                user_id: row.get("user_id"),
                bvid: row.get("bvid"),
                kind: InteractionKind::parse(&kind)?,
                created_at: Some(format_ts_iso(created_at)),
            })
        })
        .collect())
}
