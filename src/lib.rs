//! # vocarank
//!
//! Harvests a public video-ranking API on a schedule, classifies each
//! entry into a coarse category, keeps one row per video in SQLite, and
//! answers ranked, filtered and recommendation queries from a CLI and a
//! JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Scheduler  │──▶│  Fetcher   │──▶│  Classifier  │──▶│  Writer  │
//! │ / refresh   │   │ (upstream) │   │  (pure)      │   │ (single) │
//! └─────────────┘   └────────────┘   └──────────────┘   └────┬─────┘
//!                                                            ▼
//!                      ┌──────────┐      ┌────────────┐  ┌────────┐
//!                      │   CLI    │◀────▶│ Query /    │◀─│ SQLite │
//!                      │  (vrank) │      │ Recommend  │  │  WAL   │
//!                      └──────────┘      └────────────┘  └────────┘
//!                      ┌──────────┐            ▲
//!                      │   HTTP   │────────────┘
//!                      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vrank init                         # create database
//! vrank fetch --partition 30         # pull one partition now
//! vrank list --time-range week       # ranked list
//! vrank recommend --query miku       # popular, filtered
//! vrank serve                        # HTTP API + scheduler
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed fetcher and account errors |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`probe`] | Ordered JSON layout probes for upstream responses |
//! | [`fetch`] | Upstream ranking client |
//! | [`classify`] | Category assignment |
//! | [`store`] | Item upsert, queries, history, retention |
//! | [`writer`] | Single-writer task for item mutations |
//! | [`ingest`] | Refresh pipeline and coalescing guard |
//! | [`scheduler`] | Periodic refresh |
//! | [`recommend`] | Recommendation and user similarity |
//! | [`users`] | Accounts and interactions |
//! | [`social`] | Favorites, shares, friend suggestions |
//! | [`stats`] | Database statistics |
//! | [`export`] | JSON / CSV export |
//! | [`get`] | Read commands |
//! | [`partitions`] | Partition listing |
//! | [`server`] | HTTP API |
//! | [`traits`] | Extension seams |

pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetch;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod partitions;
pub mod probe;
pub mod recommend;
pub mod scheduler;
pub mod server;
pub mod social;
pub mod stats;
pub mod store;
pub mod traits;
pub mod users;
pub mod writer;
