//! Export ranked items for a date range as JSON or CSV.
//!
//! Items crawled between `start` and `end` (local calendar days, both
//! inclusive) are ranked by views and numbered from 1.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{format_ts_iso, Item};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unsupported export format: '{}' (expected json or csv)", other),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

#[derive(Serialize)]
struct RankedRow<'a> {
    ranking: usize,
    bvid: &'a str,
    title: &'a str,
    author: &'a str,
    view_count: i64,
    category: &'a str,
    crawl_time: String,
}

pub async fn export_range(
    pool: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
    format: ExportFormat,
) -> Result<String> {
    if end < start {
        bail!("end date {} is before start date {}", end, start);
    }
    let items = store::items_between(pool, start, end).await?;
    render(&items, format)
}

/// Items must already be ranked.
pub fn render(items: &[Item], format: ExportFormat) -> Result<String> {
    let rows: Vec<RankedRow> = items
        .iter()
        .enumerate()
        .map(|(i, item)| RankedRow {
            ranking: i + 1,
            bvid: &item.bvid,
            title: &item.title,
            author: &item.author,
            view_count: item.view_count,
            category: item.category.label(),
            crawl_time: format_ts_iso(item.crawl_time),
        })
        .collect();

    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
        ExportFormat::Csv => {
            let mut out = String::from("ranking,bvid,title,author,view_count,category,crawl_time\n");
            for r in &rows {
                out.push_str(&format!(
                    "{},{},{},{},{},{},{}\n",
                    r.ranking,
                    csv_field(r.bvid),
                    csv_field(r.title),
                    csv_field(r.author),
                    r.view_count,
                    csv_field(r.category),
                    r.crawl_time
                ));
            }
            Ok(out)
        }
    }
}

/// Quote a field when it contains a delimiter, quote or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// `vrank export`. Writes to `output` when given, stdout otherwise.
pub async fn run_export(
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
    format: ExportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let pool = db::open(config).await?;
    let body = export_range(&pool, start, end, format).await?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &body)?;
            eprintln!("Exported {} .. {} to {}", start, end, path.display());
        }
        None => {
            print!("{}", body);
        }
    }

    pool.close().await;
    Ok(())
}
