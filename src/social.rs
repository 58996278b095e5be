//! Favorites, shares and friend suggestions.
//!
//! Favorites are a set keyed by (user, item); adding one twice or removing
//! one that is absent changes nothing. Shares are an append-only log with a
//! free-text message and a platform tag.

use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::UserError;
use crate::models::{format_ts_iso, Favorite, Share, User};
use crate::users;

const DEFAULT_PLATFORM: &str = "internal";

async fn require_user(pool: &SqlitePool, user_id: i64) -> Result<(), UserError> {
    match users::get_user(pool, user_id).await? {
        Some(_) => Ok(()),
        None => Err(UserError::UnknownUser(user_id)),
    }
}

async fn require_item(pool: &SqlitePool, bvid: &str) -> Result<(), UserError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE bvid = ?")
        .bind(bvid)
        .fetch_one(pool)
        .await?;
    if n == 0 {
        return Err(UserError::UnknownItem(bvid.to_string()));
    }
    Ok(())
}

// ============ Favorites ============

/// Returns `false` when the item was already a favorite.
pub async fn add_favorite(pool: &SqlitePool, user_id: i64, bvid: &str) -> Result<bool, UserError> {
    require_user(pool, user_id).await?;
    require_item(pool, bvid).await?;

    let result =
        sqlx::query("INSERT OR IGNORE INTO favorites (user_id, bvid, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(bvid)
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns `false` when there was nothing to remove.
pub async fn remove_favorite(
    pool: &SqlitePool,
    user_id: i64,
    bvid: &str,
) -> Result<bool, UserError> {
    require_user(pool, user_id).await?;

    let result = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND bvid = ?")
        .bind(user_id)
        .bind(bvid)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// A user's favorites, newest first.
pub async fn list_favorites(pool: &SqlitePool, user_id: i64) -> Result<Vec<Favorite>, UserError> {
    require_user(pool, user_id).await?;

    let rows = sqlx::query(
        "SELECT user_id, bvid, created_at FROM favorites WHERE user_id = ? \
         ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let created_at: i64 = row.get("created_at");
            Favorite {
                user_id: row.get("user_id"),
                bvid: row.get("bvid"),
                created_at: format_ts_iso(created_at),
            }
        })
        .collect())
}

// ============ Shares ============

#[derive(Debug, Clone)]
pub struct NewShare {
    pub user_id: i64,
    pub bvid: String,
    pub share_text: String,
    /// Defaults to `internal`.
    pub platform: Option<String>,
}

fn row_to_share(row: &SqliteRow) -> Share {
    let created_at: i64 = row.get("created_at");
    Share {
        id: row.get("id"),
        user_id: row.get("user_id"),
        bvid: row.get("bvid"),
        share_text: row.get("share_text"),
        platform: row.get("platform"),
        created_at: format_ts_iso(created_at),
    }
}

pub async fn record_share(pool: &SqlitePool, share: &NewShare) -> Result<Share, UserError> {
    require_user(pool, share.user_id).await?;
    require_item(pool, &share.bvid).await?;

    let platform = share
        .platform
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PLATFORM);

    let id = sqlx::query(
        "INSERT INTO shares (user_id, bvid, share_text, platform, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(share.user_id)
    .bind(&share.bvid)
    .bind(&share.share_text)
    .bind(platform)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?
    .last_insert_rowid();

    let row = sqlx::query("SELECT * FROM shares WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(row_to_share(&row))
}

/// Shares of one item, oldest first.
pub async fn list_shares(pool: &SqlitePool, bvid: &str) -> Result<Vec<Share>, UserError> {
    let rows = sqlx::query("SELECT * FROM shares WHERE bvid = ? ORDER BY id")
        .bind(bvid)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_share).collect())
}

// ============ Friends ============

/// Up to `limit` other users, picked uniformly at random.
///
/// Suggestions are not interest-based; see
/// [`InterestMatrix`](crate::recommend::InterestMatrix) for the similarity
/// data a smarter picker would use.
pub async fn find_potential_friends(
    pool: &SqlitePool,
    user_id: i64,
    limit: usize,
) -> Result<Vec<User>, UserError> {
    require_user(pool, user_id).await?;

    let mut others = Vec::new();
    for id in users::list_user_ids(pool).await? {
        if id == user_id {
            continue;
        }
        if let Some(user) = users::get_user(pool, id).await? {
            others.push(user);
        }
    }

    Ok(pick_friends(others, limit, &mut rand::rng()))
}

/// Random subset of at most `limit` candidates. Fewer candidates than
/// `limit` are returned whole, in their original order.
pub fn pick_friends<R: Rng + ?Sized>(mut candidates: Vec<User>, limit: usize, rng: &mut R) -> Vec<User> {
    if candidates.len() <= limit {
        return candidates;
    }
    candidates.shuffle(rng);
    candidates.truncate(limit);
    candidates
}
