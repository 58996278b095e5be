//! Extension seams.
//!
//! Two traits let callers swap pieces of the pipeline without touching it:
//!
//! ```text
//! ┌──────────────────┐      ┌─────────────┐      ┌────────────┐
//! │  RankingSource   │─────▶│  classify   │─────▶│ StoreWriter│
//! │ upstream / test  │      └─────────────┘      └────────────┘
//! └──────────────────┘
//!
//! ┌──────────────────┐      ┌──────────────────────┐
//! │  InterestMatrix  │─────▶│  NeighborRecommender │──▶ bvids
//! │  + similarities  │      │  (caller-supplied)   │
//! └──────────────────┘      └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use vocarank::models::FetchedItem;
//! use vocarank::traits::RankingSource;
//!
//! struct Fixed(Vec<FetchedItem>);
//!
//! #[async_trait]
//! impl RankingSource for Fixed {
//!     fn name(&self) -> &str { "fixed" }
//!     async fn fetch(&self, _partition_id: i64, limit: usize) -> Vec<FetchedItem> {
//!         self.0.iter().take(limit).cloned().collect()
//!     }
//!     async fn fetch_detail(&self, bvid: &str) -> Option<FetchedItem> {
//!         self.0.iter().find(|i| i.bvid == bvid).cloned()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::models::FetchedItem;
use crate::recommend::{InterestMatrix, SimilarityMatrix};

// ═══════════════════════════════════════════════════════════════════════
// RankingSource
// ═══════════════════════════════════════════════════════════════════════

/// Where ranking entries come from.
///
/// The production implementation is [`crate::fetch::RankingClient`]. Both
/// methods are infallible by contract: an unavailable or malformed upstream
/// yields an empty list or `None`, never an error.
#[async_trait]
pub trait RankingSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Up to `limit` entries of a partition's ranking.
    async fn fetch(&self, partition_id: i64, limit: usize) -> Vec<FetchedItem>;

    /// One item's detail record.
    async fn fetch_detail(&self, bvid: &str) -> Option<FetchedItem>;
}

// ═══════════════════════════════════════════════════════════════════════
// NeighborRecommender
// ═══════════════════════════════════════════════════════════════════════

/// Turns user similarities into item recommendations.
///
/// The crate deliberately ships no implementation: choosing neighbours and
/// aggregating their preferences is left to the embedding application.
/// [`crate::recommend::user_based_recommendation`] builds the inputs and
/// delegates here.
pub trait NeighborRecommender: Send + Sync {
    /// Up to `n` item ids (bvids) to recommend to `user_id`.
    fn recommend(
        &self,
        user_id: i64,
        matrix: &InterestMatrix,
        similarities: &SimilarityMatrix,
        n: usize,
    ) -> Vec<String>;
}
