//! Item storage.
//!
//! One row per external video, keyed by `bvid`. Every write is an upsert:
//! an existing identifier has all mutable fields and `crawl_time`
//! overwritten in place; no history is kept. Batches run inside a single
//! transaction.
//!
//! Mutations should go through [`crate::writer::StoreWriter`] so that
//! concurrent producers are serialized; the free functions here are the
//! writer's primitives and the read side.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::models::{format_ts_iso, Category, Item, NewItem};

// ============ Query parameters ============

/// Column to rank by. Always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Views,
    Duration,
    CrawlTime,
}

impl SortField {
    /// Unrecognized names fall back to [`SortField::Views`].
    pub fn parse(s: &str) -> Self {
        match s {
            "duration" => SortField::Duration,
            "crawl_time" | "time" => SortField::CrawlTime,
            _ => SortField::Views,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SortField::Views => "view_count",
            SortField::Duration => "duration",
            SortField::CrawlTime => "crawl_time",
        }
    }
}

/// Window over `crawl_time`, relative to the moment of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Today,
    Week,
    Month,
    All,
}

impl TimeRange {
    /// Unrecognized names behave as [`TimeRange::All`].
    pub fn parse(s: &str) -> Self {
        match s {
            "today" | "day" => TimeRange::Today,
            "week" => TimeRange::Week,
            "month" => TimeRange::Month,
            _ => TimeRange::All,
        }
    }

    /// Inclusive lower bound as Unix seconds, or `None` for no bound.
    pub fn start_ts(&self, now: DateTime<Local>) -> Option<i64> {
        match self {
            TimeRange::Today => Some(
                local_midnight(now.date_naive()).unwrap_or(now.timestamp() - 86_400),
            ),
            TimeRange::Week => Some(now.timestamp() - 7 * 86_400),
            TimeRange::Month => Some(now.timestamp() - 30 * 86_400),
            TimeRange::All => None,
        }
    }

    /// Whether `crawl_time` falls inside the window ending at `now`.
    pub fn contains(&self, crawl_time: i64, now: DateTime<Local>) -> bool {
        match self.start_ts(now) {
            Some(start) => crawl_time >= start && crawl_time <= now.timestamp(),
            None => true,
        }
    }
}

fn local_midnight(date: NaiveDate) -> Option<i64> {
    start_of_day(date, |naive| {
        naive.and_local_timezone(Local).map(|dt| dt.timestamp())
    })
}

/// First instant of `date`. When midnight falls in a DST gap the day starts
/// at the first representable minute after it.
fn start_of_day(
    date: NaiveDate,
    resolve: impl Fn(NaiveDateTime) -> LocalResult<i64>,
) -> Option<i64> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    (0..24 * 60).find_map(|minute| resolve(midnight + chrono::Duration::minutes(minute)).earliest())
}

#[derive(Debug, Clone)]
pub struct ItemQuery {
    pub sort: SortField,
    pub time_range: TimeRange,
    pub partition: Option<i64>,
    pub limit: i64,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            sort: SortField::Views,
            time_range: TimeRange::All,
            partition: None,
            limit: 20,
        }
    }
}

// ============ Writes ============

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub received: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UpsertReport {
    /// Rows written (inserted or overwritten).
    pub fn saved(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upsert a batch stamped with the current time.
pub async fn upsert_items(
    pool: &SqlitePool,
    items: &[NewItem],
    overwrite_existing: bool,
) -> Result<UpsertReport> {
    upsert_items_at(pool, items, overwrite_existing, chrono::Utc::now().timestamp()).await
}

/// Upsert a batch with an explicit crawl timestamp.
///
/// With `overwrite_existing = false` identifiers already stored are left
/// untouched and counted as skipped.
pub async fn upsert_items_at(
    pool: &SqlitePool,
    items: &[NewItem],
    overwrite_existing: bool,
    crawl_time: i64,
) -> Result<UpsertReport> {
    let mut report = UpsertReport {
        received: items.len(),
        ..Default::default()
    };

    let mut tx = pool.begin().await?;

    for item in items {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE bvid = ?")
            .bind(&item.bvid)
            .fetch_one(&mut *tx)
            .await?;
        let exists = n > 0;

        if exists && !overwrite_existing {
            report.skipped += 1;
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO items (bvid, title, author, cover_url, duration, tags, view_count, category, partition_id, crawl_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bvid) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                cover_url = excluded.cover_url,
                duration = excluded.duration,
                tags = excluded.tags,
                view_count = excluded.view_count,
                category = excluded.category,
                partition_id = excluded.partition_id,
                crawl_time = excluded.crawl_time
            "#,
        )
        .bind(&item.bvid)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.cover_url)
        .bind(item.duration_secs)
        .bind(item.joined_tags())
        .bind(item.view_count)
        .bind(item.category.label())
        .bind(item.partition_id)
        .bind(crawl_time)
        .execute(&mut *tx)
        .await?;

        if exists {
            report.updated += 1;
        } else {
            report.inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(report)
}

/// Longest retention window a cleanup accepts, roughly a century.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Unix cutoff for a retention window of `days` ending at `now_ts`.
pub fn retention_cutoff(now_ts: i64, days: i64) -> Result<i64> {
    if !(1..=MAX_RETENTION_DAYS).contains(&days) {
        bail!("days must be between 1 and {}", MAX_RETENTION_DAYS);
    }
    days.checked_mul(86_400)
        .and_then(|secs| now_ts.checked_sub(secs))
        .ok_or_else(|| anyhow!("retention window of {} days is out of range", days))
}

/// Outcome of a retention pass.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub items_deleted: u64,
    pub interactions_deleted: u64,
    pub favorites_deleted: u64,
    pub shares_deleted: u64,
    pub cutoff: String, // ISO8601
    pub backup_file: Option<PathBuf>,
}

// Rows that reference an item; removed before the item itself.
const DEPENDENT_DELETES: [&str; 3] = [
    "DELETE FROM interactions WHERE bvid IN (SELECT bvid FROM items WHERE crawl_time < ?)",
    "DELETE FROM favorites WHERE bvid IN (SELECT bvid FROM items WHERE crawl_time < ?)",
    "DELETE FROM shares WHERE bvid IN (SELECT bvid FROM items WHERE crawl_time < ?)",
];

#[derive(Serialize)]
struct BackupFile {
    backup_time: String,
    cutoff: String,
    item_count: usize,
    items: Vec<crate::models::ItemResponse>,
}

/// Delete items crawled before `now - days`, together with the
/// interactions, favorites and shares that point at them.
///
/// When `backup_dir` is given, the doomed rows are written there as JSON
/// before anything is deleted. `days` outside `1..=MAX_RETENTION_DAYS` is
/// rejected before touching the database.
pub async fn cleanup_older_than(
    pool: &SqlitePool,
    days: i64,
    backup_dir: Option<&Path>,
) -> Result<CleanupReport> {
    let now = chrono::Utc::now();
    let cutoff = retention_cutoff(now.timestamp(), days)?;

    let mut backup_file = None;
    if let Some(dir) = backup_dir {
        let rows = sqlx::query("SELECT * FROM items WHERE crawl_time < ? ORDER BY crawl_time")
            .bind(cutoff)
            .fetch_all(pool)
            .await?;
        let doomed: Vec<Item> = rows.iter().map(row_to_item).collect();

        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("backup_{}.json", now.format("%Y%m%d_%H%M%S")));
        let body = BackupFile {
            backup_time: now.to_rfc3339(),
            cutoff: format_ts_iso(cutoff),
            item_count: doomed.len(),
            items: doomed.iter().map(Into::into).collect(),
        };
        std::fs::write(&path, serde_json::to_string_pretty(&body)?)?;
        backup_file = Some(path);
    }

    let mut tx = pool.begin().await?;
    let mut dependents = [0u64; 3];
    for (n, sql) in DEPENDENT_DELETES.iter().enumerate() {
        dependents[n] = sqlx::query(*sql)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    let items = sqlx::query("DELETE FROM items WHERE crawl_time < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(CleanupReport {
        items_deleted: items.rows_affected(),
        interactions_deleted: dependents[0],
        favorites_deleted: dependents[1],
        shares_deleted: dependents[2],
        cutoff: format_ts_iso(cutoff),
        backup_file,
    })
}

// ============ Reads ============

pub(crate) fn row_to_item(row: &SqliteRow) -> Item {
    let category: String = row.get("category");
    Item {
        bvid: row.get("bvid"),
        title: row.get("title"),
        author: row.get("author"),
        cover_url: row.get("cover_url"),
        duration: row.get("duration"),
        tags: row.get("tags"),
        view_count: row.get("view_count"),
        category: Category::from_label(&category),
        partition_id: row.get("partition_id"),
        crawl_time: row.get("crawl_time"),
    }
}

pub async fn get_item(pool: &SqlitePool, bvid: &str) -> Result<Option<Item>> {
    let row = sqlx::query("SELECT * FROM items WHERE bvid = ?")
        .bind(bvid)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_item))
}

pub async fn all_items(pool: &SqlitePool) -> Result<Vec<Item>> {
    let rows = sqlx::query("SELECT * FROM items ORDER BY bvid")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_item).collect())
}

pub async fn count_items(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Ranked, filtered read.
pub async fn query_items(pool: &SqlitePool, query: &ItemQuery) -> Result<Vec<Item>> {
    query_items_at(pool, query, Local::now()).await
}

pub async fn query_items_at(
    pool: &SqlitePool,
    query: &ItemQuery,
    now: DateTime<Local>,
) -> Result<Vec<Item>> {
    // Column name comes from a closed enum, never from user input.
    let sql = format!(
        "SELECT * FROM items \
         WHERE (? IS NULL OR crawl_time >= ?) AND (? IS NULL OR crawl_time <= ?) \
           AND (? IS NULL OR partition_id = ?) \
         ORDER BY {} DESC, bvid ASC \
         LIMIT ?",
        query.sort.column()
    );

    let start = query.time_range.start_ts(now);
    let end = start.map(|_| now.timestamp());

    let rows = sqlx::query(&sql)
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .bind(query.partition)
        .bind(query.partition)
        .bind(query.limit.max(0))
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(row_to_item).collect())
}

/// Items crawled on `date` (local calendar day), ranked by views.
pub async fn historical_ranking(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Item>> {
    let start = local_midnight(date).ok_or_else(|| anyhow!("invalid date: {}", date))?;
    let next = date
        .succ_opt()
        .and_then(local_midnight)
        .ok_or_else(|| anyhow!("invalid date: {}", date))?;

    let rows = sqlx::query(
        "SELECT * FROM items WHERE crawl_time >= ? AND crawl_time < ? \
         ORDER BY view_count DESC, bvid ASC",
    )
    .bind(start)
    .bind(next)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_item).collect())
}

/// Items crawled between two local dates (both inclusive), ranked by views.
pub async fn items_between(pool: &SqlitePool, start: NaiveDate, end: NaiveDate) -> Result<Vec<Item>> {
    let from = local_midnight(start).ok_or_else(|| anyhow!("invalid date: {}", start))?;
    let to = end
        .succ_opt()
        .and_then(local_midnight)
        .ok_or_else(|| anyhow!("invalid date: {}", end))?;

    let rows = sqlx::query(
        "SELECT * FROM items WHERE crawl_time >= ? AND crawl_time < ? \
         ORDER BY view_count DESC, bvid ASC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_item).collect())
}
