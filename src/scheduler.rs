//! Periodic refresh.
//!
//! A background tokio task runs a refresh immediately and then once per
//! interval until stopped. The wait is split into one-second slices so a
//! stop request is honoured promptly. Errors inside a cycle are logged and
//! never end the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::ingest::{run_refresh, RefreshGuard, RefreshRequest};
use crate::traits::RankingSource;
use crate::writer::StoreWriter;

const SLICE: Duration = Duration::from_secs(1);

/// What a cycle needs to run.
#[derive(Clone)]
pub struct SchedulerContext {
    pub source: Arc<dyn RankingSource>,
    pub writer: StoreWriter,
    pub guard: RefreshGuard,
}

pub struct Scheduler;

/// Owns the background task's lifecycle.
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(ctx: SchedulerContext, request: RefreshRequest, interval: Duration) -> SchedulerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let task = tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                partitions = ?request.partitions,
                "scheduler started"
            );

            while flag.load(Ordering::Acquire) {
                run_cycle(&ctx, &request).await;
                if sleep_while_running(&flag, interval).await {
                    break;
                }
            }

            tracing::info!("scheduler stopped");
        });

        SchedulerHandle {
            running,
            task: Some(task),
        }
    }
}

async fn run_cycle(ctx: &SchedulerContext, request: &RefreshRequest) {
    let Some(_permit) = ctx.guard.try_acquire() else {
        tracing::info!("refresh already in progress, skipping scheduled cycle");
        return;
    };

    let report = run_refresh(ctx.source.as_ref(), &ctx.writer, request).await;
    for partition in &report.failed_partitions {
        tracing::error!(partition, "scheduled refresh failed for partition");
    }
    tracing::info!(
        fetched = report.total_fetched,
        saved = report.total_saved,
        "scheduled refresh finished"
    );
}

/// Returns `true` if the flag was cleared before `total` elapsed.
async fn sleep_while_running(flag: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if !flag.load(Ordering::Acquire) {
            return true;
        }
        let step = remaining.min(SLICE);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    !flag.load(Ordering::Acquire)
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Ask the loop to exit at its next check.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "scheduler task panicked");
            }
        }
    }

    pub async fn shutdown(mut self) {
        self.stop();
        self.join().await;
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
