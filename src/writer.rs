//! Single-writer gateway for item mutations.
//!
//! One tokio task owns every write to the `items` table. Producers hold a
//! cloneable [`StoreWriter`] and submit commands; each command carries a
//! `oneshot` sender for its result. Commands are applied strictly in
//! arrival order, so two refreshes racing on the same identifier can never
//! interleave inside an upsert batch.

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::NewItem;
use crate::store::{self, CleanupReport, UpsertReport};

const QUEUE_CAPACITY: usize = 64;

enum WriterCommand {
    Upsert {
        items: Vec<NewItem>,
        overwrite_existing: bool,
        response: oneshot::Sender<Result<UpsertReport>>,
    },
    Cleanup {
        days: i64,
        backup_dir: Option<PathBuf>,
        response: oneshot::Sender<Result<CleanupReport>>,
    },
}

/// Handle to the writer task.
#[derive(Clone)]
pub struct StoreWriter {
    sender: mpsc::Sender<WriterCommand>,
}

impl StoreWriter {
    /// Start the writer task. It exits once every handle is dropped.
    pub fn spawn(pool: SqlitePool) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(run_writer(pool, receiver));
        (Self { sender }, task)
    }

    pub async fn upsert(&self, items: Vec<NewItem>, overwrite_existing: bool) -> Result<UpsertReport> {
        let (response, rx) = oneshot::channel();
        self.submit(WriterCommand::Upsert {
            items,
            overwrite_existing,
            response,
        })
        .await?;
        rx.await.map_err(|_| anyhow!("store writer dropped the response"))?
    }

    pub async fn cleanup(&self, days: i64, backup_dir: Option<PathBuf>) -> Result<CleanupReport> {
        let (response, rx) = oneshot::channel();
        self.submit(WriterCommand::Cleanup {
            days,
            backup_dir,
            response,
        })
        .await?;
        rx.await.map_err(|_| anyhow!("store writer dropped the response"))?
    }

    async fn submit(&self, command: WriterCommand) -> Result<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| anyhow!("store writer is not running"))
    }
}

async fn run_writer(pool: SqlitePool, mut receiver: mpsc::Receiver<WriterCommand>) {
    tracing::debug!("store writer started");

    while let Some(command) = receiver.recv().await {
        match command {
            WriterCommand::Upsert {
                items,
                overwrite_existing,
                response,
            } => {
                let result = store::upsert_items(&pool, &items, overwrite_existing).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, count = items.len(), "upsert failed");
                }
                // Receiver may have given up; nothing to do then.
                let _ = response.send(result);
            }
            WriterCommand::Cleanup {
                days,
                backup_dir,
                response,
            } => {
                let result = store::cleanup_older_than(&pool, days, backup_dir.as_deref()).await;
                if let Err(e) = &result {
                    tracing::error!(error = %e, days, "cleanup failed");
                }
                let _ = response.send(result);
            }
        }
    }

    tracing::debug!("store writer stopped");
}
