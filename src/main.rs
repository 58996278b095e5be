//! # vocarank CLI (`vrank`)
//!
//! The `vrank` binary is the primary interface for vocarank. It initializes
//! the database, pulls rankings from upstream, answers ranked and
//! recommendation queries, maintains the store, and runs the HTTP server
//! with its background scheduler.
//!
//! ## Usage
//!
//! ```bash
//! vrank --config ./config/vrank.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vrank init` | Create the SQLite database and run schema migrations |
//! | `vrank partitions` | List known partitions and which ones are scheduled |
//! | `vrank fetch` | Run one refresh against upstream |
//! | `vrank list` | Ranked item list |
//! | `vrank get <bvid>` | One item |
//! | `vrank recommend` | Popular or random recommendations |
//! | `vrank similarity` | Pairwise user similarity table |
//! | `vrank stats` | Database statistics |
//! | `vrank history` | Items crawled on one day |
//! | `vrank export` | JSON or CSV export of a date range |
//! | `vrank cleanup` | Delete old items, with a JSON backup |
//! | `vrank serve` | HTTP server plus scheduler |
//!
//! ## Examples
//!
//! ```bash
//! vrank init --config ./config/vrank.toml
//! vrank fetch --partition 30 --limit 10 --dry-run
//! vrank list --sort-by views --time-range week
//! vrank recommend --query miku --random
//! vrank serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vocarank::export::ExportFormat;
use vocarank::recommend::RecommendRequest;
use vocarank::store::{TimeRange, MAX_RETENTION_DAYS};
use vocarank::writer::StoreWriter;
use vocarank::{config, db, export, get, ingest, migrate, partitions, recommend, server, stats};

/// vocarank CLI: harvest, store and query video rankings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/vrank.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "vrank",
    about = "vocarank — harvest, store and recommend from public video rankings",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/vrank.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List known partitions, their category, and whether they are scheduled.
    Partitions,

    /// Run one refresh against the configured upstream.
    Fetch {
        /// Partition id to fetch. Repeatable. Defaults to the scheduled set.
        #[arg(long = "partition")]
        partitions: Vec<i64>,

        /// Entries per partition.
        #[arg(long)]
        limit: Option<usize>,

        /// Overwrite items that are already stored.
        #[arg(long)]
        force: bool,

        /// Fetch and classify, print counts, write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ranked item list.
    List {
        /// `views`, `duration` or `crawl_time`.
        #[arg(long, default_value = "views")]
        sort_by: String,

        #[arg(long)]
        limit: Option<i64>,

        /// `today`, `week`, `month` or `all`.
        #[arg(long, default_value = "all")]
        time_range: String,

        #[arg(long)]
        partition: Option<i64>,
    },

    /// Show one item.
    Get {
        /// Item identifier (bvid).
        bvid: String,
    },

    /// Popular (or random) recommendations.
    Recommend {
        #[arg(long)]
        user: Option<i64>,

        /// Clamped to `[retrieval] max_limit`.
        #[arg(long)]
        limit: Option<i64>,

        #[arg(long, default_value = "all")]
        time_range: String,

        /// Case-insensitive match on title, author or tags.
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        random: bool,
    },

    /// Print the pairwise user similarity table.
    Similarity,

    /// Database statistics.
    Stats,

    /// Items crawled on one day, ranked by views.
    History {
        /// YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },

    /// Export ranked items crawled between two dates.
    Export {
        /// YYYY-MM-DD, inclusive.
        #[arg(long)]
        start: String,

        /// YYYY-MM-DD, inclusive.
        #[arg(long)]
        end: String,

        /// `json` or `csv`.
        #[arg(long, default_value = "json")]
        format: String,

        /// Write here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete items older than the retention window.
    Cleanup {
        /// Overrides `[retention] days_to_keep`.
        #[arg(long)]
        days: Option<i64>,

        /// Skip the JSON backup.
        #[arg(long)]
        no_backup: bool,
    },

    /// Start the HTTP server (and the scheduler when enabled).
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vocarank=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Partitions => {
            partitions::list_partitions(&cfg)?;
        }
        Commands::Fetch {
            partitions,
            limit,
            force,
            dry_run,
        } => {
            ingest::run_fetch(&cfg, partitions, limit, force, dry_run).await?;
        }
        Commands::List {
            sort_by,
            limit,
            time_range,
            partition,
        } => {
            get::run_list(&cfg, &sort_by, limit, &time_range, partition).await?;
        }
        Commands::Get { bvid } => {
            get::run_get(&cfg, &bvid).await?;
        }
        Commands::Recommend {
            user,
            limit,
            time_range,
            query,
            random,
        } => {
            let req = RecommendRequest {
                user_id: user,
                limit: cfg.retrieval.resolve_recommend_limit(limit),
                time_range: TimeRange::parse(&time_range),
                search_query: query,
                randomize: random,
            };
            recommend::run_recommend(&cfg, &req).await?;
        }
        Commands::Similarity => {
            recommend::run_similarity(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::History { date } => {
            get::run_history(&cfg, date.as_deref()).await?;
        }
        Commands::Export {
            start,
            end,
            format,
            output,
        } => {
            let start = chrono::NaiveDate::parse_from_str(&start, "%Y-%m-%d")?;
            let end = chrono::NaiveDate::parse_from_str(&end, "%Y-%m-%d")?;
            let format = ExportFormat::parse(&format)?;
            export::run_export(&cfg, start, end, format, output.as_deref()).await?;
        }
        Commands::Cleanup { days, no_backup } => {
            let days = days.unwrap_or(cfg.retention.days_to_keep);
            if !(1..=MAX_RETENTION_DAYS).contains(&days) {
                anyhow::bail!("--days must be between 1 and {}", MAX_RETENTION_DAYS);
            }
            let backup_dir = (!no_backup).then(|| cfg.retention.backup_dir.clone());

            let pool = db::open(&cfg).await?;
            let (writer, task) = StoreWriter::spawn(pool.clone());
            let report = writer.cleanup(days, backup_dir).await?;
            drop(writer);
            let _ = task.await;
            pool.close().await;

            println!("cleanup");
            println!("  cutoff: {}", report.cutoff);
            println!("  items deleted: {}", report.items_deleted);
            println!("  interactions deleted: {}", report.interactions_deleted);
            println!("  favorites deleted: {}", report.favorites_deleted);
            println!("  shares deleted: {}", report.shares_deleted);
            if let Some(path) = &report.backup_file {
                println!("  backup: {}", path.display());
            }
            println!("ok");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
