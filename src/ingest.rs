//! Refresh pipeline orchestration.
//!
//! Coordinates one refresh: source → classify → writer, partition by
//! partition. A failing partition is logged and recorded in the report; it
//! never stops the remaining partitions.
//!
//! [`RefreshGuard`] coalesces concurrent refreshes within a process: a
//! caller that cannot acquire it skips its refresh instead of queueing.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::classify::classify_item;
use crate::config::Config;
use crate::db;
use crate::fetch::RankingClient;
use crate::models::{Category, NewItem};
use crate::traits::RankingSource;
use crate::writer::StoreWriter;

#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub partitions: Vec<i64>,
    /// Per partition.
    pub limit: usize,
    /// Overwrite items already stored; otherwise only new ids are inserted.
    pub force_update: bool,
    /// Pause between partitions.
    pub partition_delay: Duration,
}

impl RefreshRequest {
    /// Request built from the scheduler section of the config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            partitions: config.scheduler.partitions.clone(),
            limit: config.scheduler.per_partition_limit,
            force_update: config.scheduler.force_update,
            partition_delay: Duration::from_millis(config.upstream.request_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub total_fetched: usize,
    pub total_saved: usize,
    pub failed_partitions: Vec<i64>,
    /// Local wall-clock time the refresh finished, `%Y-%m-%d %H:%M:%S`.
    pub fetch_time: String,
}

/// Process-wide "refresh in flight" flag.
#[derive(Clone, Default)]
pub struct RefreshGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of a refresh; releases the guard on drop.
pub struct RefreshPermit {
    busy: Arc<AtomicBool>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another refresh holds the guard.
    pub fn try_acquire(&self) -> Option<RefreshPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshPermit {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Fetch and classify one partition.
pub async fn collect_partition(
    source: &dyn RankingSource,
    partition_id: i64,
    limit: usize,
) -> Vec<NewItem> {
    source
        .fetch(partition_id, limit)
        .await
        .into_iter()
        .map(classify_item)
        .collect()
}

/// Run one refresh.
pub async fn run_refresh(
    source: &dyn RankingSource,
    writer: &StoreWriter,
    req: &RefreshRequest,
) -> RefreshReport {
    let mut total_fetched = 0usize;
    let mut total_saved = 0usize;
    let mut failed_partitions = Vec::new();

    for (i, &partition) in req.partitions.iter().enumerate() {
        if i > 0 && !req.partition_delay.is_zero() {
            tokio::time::sleep(req.partition_delay).await;
        }

        let items = collect_partition(source, partition, req.limit).await;
        total_fetched += items.len();
        tracing::info!(
            source = source.name(),
            partition,
            fetched = items.len(),
            "partition fetched"
        );

        if items.is_empty() {
            continue;
        }

        match writer.upsert(items, req.force_update).await {
            Ok(report) => {
                total_saved += report.saved();
                tracing::info!(
                    partition,
                    inserted = report.inserted,
                    updated = report.updated,
                    skipped = report.skipped,
                    "partition saved"
                );
            }
            Err(e) => {
                tracing::error!(partition, error = %e, "failed to save partition");
                failed_partitions.push(partition);
            }
        }
    }

    RefreshReport {
        total_fetched,
        total_saved,
        failed_partitions,
        fetch_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// `vrank fetch`: one refresh against the configured upstream.
pub async fn run_fetch(
    config: &Config,
    partitions: Vec<i64>,
    limit: Option<usize>,
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let client = RankingClient::new(&config.upstream)?;

    let mut req = RefreshRequest::from_config(config);
    if !partitions.is_empty() {
        req.partitions = partitions;
    }
    if let Some(limit) = limit {
        req.limit = limit;
    }
    req.force_update = req.force_update || force;

    if dry_run {
        let mut by_category: BTreeMap<Category, usize> = BTreeMap::new();
        let mut fetched = 0usize;
        for &partition in &req.partitions {
            let items = collect_partition(&client, partition, req.limit).await;
            println!("  partition {}: {} items", partition, items.len());
            fetched += items.len();
            for item in &items {
                *by_category.entry(item.category).or_default() += 1;
            }
        }
        println!("fetch (dry-run)");
        println!("  fetched: {}", fetched);
        for (category, count) in &by_category {
            println!("  {}: {}", category, count);
        }
        return Ok(());
    }

    let pool = db::open(config).await?;
    let (writer, writer_task) = StoreWriter::spawn(pool.clone());

    let report = run_refresh(&client, &writer, &req).await;

    drop(writer);
    let _ = writer_task.await;
    pool.close().await;

    println!("fetch");
    println!("  partitions: {:?}", req.partitions);
    println!("  fetched: {}", report.total_fetched);
    println!("  saved: {}", report.total_saved);
    if !report.failed_partitions.is_empty() {
        println!("  failed partitions: {:?}", report.failed_partitions);
    }
    println!("  fetch time: {}", report.fetch_time);
    println!("ok");

    Ok(())
}
