//! Database statistics.
//!
//! [`collect_stats`] gathers totals, the per-category breakdown and the
//! crawl-time span; `vrank stats` prints them and `GET /api/stats` returns
//! them as JSON.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::models::Category;

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MostViewed {
    pub bvid: String,
    pub title: String,
    pub view_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub total_items: i64,
    pub total_users: i64,
    pub total_interactions: i64,
    pub total_favorites: i64,
    pub total_shares: i64,
    pub by_category: Vec<CategoryCount>,
    /// `YYYY-MM-DD`, local time.
    pub oldest_crawl: Option<String>,
    pub newest_crawl: Option<String>,
    pub most_viewed: Option<MostViewed>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<DbStats> {
    let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await?;
    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    let total_interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
        .fetch_one(pool)
        .await?;

    let total_favorites: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites")
        .fetch_one(pool)
        .await?;
    let total_shares: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shares")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query("SELECT category, COUNT(*) AS n FROM items GROUP BY category")
        .fetch_all(pool)
        .await?;
    // Every category appears, in a fixed order, even at zero.
    let by_category = Category::all()
        .iter()
        .map(|c| {
            let count = rows
                .iter()
                .find(|r| r.get::<String, _>("category") == c.label())
                .map(|r| r.get::<i64, _>("n"))
                .unwrap_or(0);
            CategoryCount {
                category: c.label().to_string(),
                count,
            }
        })
        .collect();

    let span = sqlx::query("SELECT MIN(crawl_time) AS oldest, MAX(crawl_time) AS newest FROM items")
        .fetch_one(pool)
        .await?;
    let oldest: Option<i64> = span.get("oldest");
    let newest: Option<i64> = span.get("newest");

    let most_viewed = sqlx::query(
        "SELECT bvid, title, view_count FROM items ORDER BY view_count DESC, bvid ASC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .map(|row| MostViewed {
        bvid: row.get("bvid"),
        title: row.get("title"),
        view_count: row.get("view_count"),
    });

    Ok(DbStats {
        total_items,
        total_users,
        total_interactions,
        total_favorites,
        total_shares,
        by_category,
        oldest_crawl: oldest.map(format_day),
        newest_crawl: newest.map(format_day),
        most_viewed,
    })
}

/// `vrank stats`.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let stats = collect_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("vocarank — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Items:         {}", stats.total_items);
    println!("  Users:         {}", stats.total_users);
    println!("  Interactions:  {}", stats.total_interactions);
    println!("  Favorites:     {}", stats.total_favorites);
    println!("  Shares:        {}", stats.total_shares);

    if let (Some(oldest), Some(newest)) = (&stats.oldest_crawl, &stats.newest_crawl) {
        println!("  Crawled:       {} .. {}", oldest, newest);
    }
    if let Some(top) = &stats.most_viewed {
        println!("  Most viewed:   {} ({} views)", top.title, top.view_count);
    }

    println!();
    println!("  By category:");
    println!("  {:<16} {:>8}", "CATEGORY", "ITEMS");
    println!("  {}", "-".repeat(25));
    for c in &stats.by_category {
        println!("  {:<16} {:>8}", c.category, c.count);
    }
    println!();

    pool.close().await;
    Ok(())
}

fn format_day(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d")
                .to_string()
        })
        .unwrap_or_else(|| ts.to_string())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
