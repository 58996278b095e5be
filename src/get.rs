//! Read commands: single item, ranked list, and per-day history.
//!
//! Thin CLI wrappers over [`crate::store`]; the HTTP server calls the store
//! directly.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use crate::config::Config;
use crate::db;
use crate::models::{format_ts_iso, Item};
use crate::store::{self, ItemQuery, SortField, TimeRange};

/// `vrank get <bvid>`.
pub async fn run_get(config: &Config, bvid: &str) -> Result<()> {
    let pool = db::open(config).await?;
    let item = store::get_item(&pool, bvid).await?;
    pool.close().await;

    let Some(item) = item else {
        bail!("item not found: {}", bvid);
    };

    println!("--- Item ---");
    println!("bvid:         {}", item.bvid);
    println!("title:        {}", item.title);
    println!("author:       {}", item.author);
    println!("category:     {}", item.category);
    println!("partition:    {}", item.partition_id);
    println!("views:        {}", item.view_count);
    println!("duration:     {}", format_duration(item.duration));
    if !item.tags.is_empty() {
        println!("tags:         {}", item.tags);
    }
    if let Some(ref url) = item.cover_url {
        println!("cover_url:    {}", url);
    }
    println!("crawl_time:   {}", format_ts_iso(item.crawl_time));

    Ok(())
}

/// `vrank list`.
pub async fn run_list(
    config: &Config,
    sort_by: &str,
    limit: Option<i64>,
    time_range: &str,
    partition: Option<i64>,
) -> Result<()> {
    let pool = db::open(config).await?;
    let query = ItemQuery {
        sort: SortField::parse(sort_by),
        time_range: TimeRange::parse(time_range),
        partition,
        limit: config.retrieval.clamp_limit(limit),
    };
    let items = store::query_items(&pool, &query).await?;
    pool.close().await;

    print_ranked(&items);
    Ok(())
}

/// `vrank history [--date YYYY-MM-DD]`. Defaults to today.
pub async fn run_history(config: &Config, date: Option<&str>) -> Result<()> {
    let date = match date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", s))?,
        None => chrono::Local::now().date_naive(),
    };

    let pool = db::open(config).await?;
    let items = store::historical_ranking(&pool, date).await?;
    pool.close().await;

    println!("ranking for {} ({} items)", date, items.len());
    print_ranked(&items);
    Ok(())
}

pub(crate) fn print_ranked(items: &[Item]) {
    if items.is_empty() {
        println!("No items.");
        return;
    }
    for (i, item) in items.iter().enumerate() {
        println!(
            "{:>3}. {}  {:>10} views  [{}]  {} — {}",
            i + 1,
            item.bvid,
            item.view_count,
            item.category,
            item.title,
            item.author
        );
    }
}

fn format_duration(secs: i64) -> String {
    if secs <= 0 {
        return "unknown".to_string();
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
