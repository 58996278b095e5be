//! Popularity / random recommendation and the interest-matrix scaffolding
//! for collaborative filtering.
//!
//! # Candidate pipeline
//!
//! ```text
//! base set ──▶ time window ──▶ text search ──▶ shuffle? ──▶ truncate(limit)
//! ```
//!
//! The base set is the top `2 × limit` items by views, or, when randomizing,
//! a uniform sample of up to `3 × limit` items from the whole store. Filters
//! run *after* the base set is taken, so a narrow window or search can
//! return fewer than `limit` items. The result is never padded.
//!
//! # Collaborative filter
//!
//! [`InterestMatrix`] scores every (user, item) pair from recorded
//! interactions and [`InterestMatrix::similarity_matrix`] compares users by
//! cosine similarity. Picking neighbours and producing recommendations from
//! them is delegated to a caller-supplied
//! [`NeighborRecommender`](crate::traits::NeighborRecommender).

use anyhow::Result;
use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;
use crate::models::{Interaction, Item};
use crate::store::{self, ItemQuery, SortField, TimeRange};
use crate::traits::NeighborRecommender;
use crate::users;

/// Parameters of one recommendation call.
#[derive(Debug, Clone)]
pub struct RecommendRequest {
    /// Accepted for API compatibility; does not personalize the result.
    pub user_id: Option<i64>,
    pub limit: usize,
    pub time_range: TimeRange,
    pub search_query: Option<String>,
    pub randomize: bool,
}

impl Default for RecommendRequest {
    fn default() -> Self {
        Self {
            user_id: None,
            limit: 10,
            time_range: TimeRange::All,
            search_query: None,
            randomize: false,
        }
    }
}

/// Recommend items from the store.
///
/// `limit` is not clamped here; callers resolve it against
/// [`RetrievalConfig`](crate::config::RetrievalConfig) first.
pub async fn recommend(pool: &SqlitePool, req: &RecommendRequest) -> Result<Vec<Item>> {
    // ThreadRng is !Send; seed a Send generator before the first await.
    let mut rng = StdRng::from_rng(&mut rand::rng());
    let base = if req.randomize {
        let all = store::all_items(pool).await?;
        sample_base(all, req.limit.saturating_mul(3), &mut rng)
    } else {
        let query = ItemQuery {
            sort: SortField::Views,
            time_range: TimeRange::All,
            partition: None,
            limit: i64::try_from(req.limit.saturating_mul(2)).unwrap_or(i64::MAX),
        };
        store::query_items(pool, &query).await?
    };

    Ok(select_candidates(base, req, Local::now(), &mut rng))
}

/// Uniform sample without replacement of at most `n` items.
pub fn sample_base<R: Rng + ?Sized>(mut all: Vec<Item>, n: usize, rng: &mut R) -> Vec<Item> {
    all.shuffle(rng);
    all.truncate(n);
    all
}

/// Apply the filter chain to a base candidate set.
///
/// Pure apart from the RNG, which is only consulted when
/// `req.randomize` is set.
pub fn select_candidates<R: Rng + ?Sized>(
    candidates: Vec<Item>,
    req: &RecommendRequest,
    now: DateTime<Local>,
    rng: &mut R,
) -> Vec<Item> {
    let mut out: Vec<Item> = candidates
        .into_iter()
        .filter(|item| req.time_range.contains(item.crawl_time, now))
        .collect();

    if let Some(q) = req.search_query.as_deref().filter(|q| !q.is_empty()) {
        let q = q.to_lowercase();
        out.retain(|item| matches_query(item, &q));
    }

    if req.randomize {
        out.shuffle(rng);
    }

    out.truncate(req.limit);
    out
}

/// `needle` must already be lowercased.
fn matches_query(item: &Item, needle: &str) -> bool {
    item.title.to_lowercase().contains(needle)
        || item.author.to_lowercase().contains(needle)
        || item.tags.to_lowercase().contains(needle)
}

// ============ Collaborative filtering ============

/// Cosine similarity between two score vectors.
///
/// Returns 0.0 for empty or mismatched inputs and when either vector has
/// zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// User × item interest scores.
///
/// Every user vector is indexed by [`InterestMatrix::items`]; a pair with no
/// interaction scores 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestMatrix {
    pub items: Vec<String>,
    pub users: BTreeMap<i64, Vec<f64>>,
}

/// `similarities[a][b]` for every pair of users.
pub type SimilarityMatrix = BTreeMap<i64, BTreeMap<i64, f64>>;

impl InterestMatrix {
    /// Build from the full user list, item list and interaction log.
    ///
    /// Interactions naming an unknown user or item are ignored. Several
    /// kinds on one pair keep the highest weight.
    pub fn build(user_ids: &[i64], item_ids: &[String], interactions: &[Interaction]) -> Self {
        let index: BTreeMap<&str, usize> = item_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut users: BTreeMap<i64, Vec<f64>> = user_ids
            .iter()
            .map(|id| (*id, vec![0.0; item_ids.len()]))
            .collect();

        for interaction in interactions {
            let Some(&col) = index.get(interaction.bvid.as_str()) else {
                continue;
            };
            let Some(row) = users.get_mut(&interaction.user_id) else {
                continue;
            };
            let w = interaction.kind.weight();
            if w > row[col] {
                row[col] = w;
            }
        }

        Self {
            items: item_ids.to_vec(),
            users,
        }
    }

    pub fn score(&self, user_id: i64, bvid: &str) -> f64 {
        let Some(col) = self.items.iter().position(|i| i == bvid) else {
            return 0.0;
        };
        self.users.get(&user_id).map(|row| row[col]).unwrap_or(0.0)
    }

    /// Pairwise cosine similarity. A user compared with itself is 1.0.
    pub fn similarity_matrix(&self) -> SimilarityMatrix {
        let mut out = SimilarityMatrix::new();
        for (a, va) in &self.users {
            let row = out.entry(*a).or_default();
            for (b, vb) in &self.users {
                let sim = if a == b { 1.0 } else { cosine_similarity(va, vb) };
                row.insert(*b, sim);
            }
        }
        out
    }
}

/// Load the interest matrix from the database.
pub async fn load_interest_matrix(pool: &SqlitePool) -> Result<InterestMatrix> {
    let user_ids = users::list_user_ids(pool).await?;
    let item_ids: Vec<String> = store::all_items(pool)
        .await?
        .into_iter()
        .map(|i| i.bvid)
        .collect();
    let interactions = users::list_interactions(pool).await?;
    Ok(InterestMatrix::build(&user_ids, &item_ids, &interactions))
}

/// Neighbour-based recommendation for `user_id`.
///
/// Builds the interest and similarity matrices, hands them to
/// `recommender`, and resolves the returned ids against the store,
/// dropping ids that no longer exist.
pub async fn user_based_recommendation(
    pool: &SqlitePool,
    user_id: i64,
    recommender: &dyn NeighborRecommender,
    n: usize,
) -> Result<Vec<Item>> {
    let matrix = load_interest_matrix(pool).await?;
    let similarities = matrix.similarity_matrix();
    let ids = recommender.recommend(user_id, &matrix, &similarities, n);

    let mut out = Vec::with_capacity(ids.len().min(n));
    for id in ids.iter().take(n) {
        if let Some(item) = store::get_item(pool, id).await? {
            out.push(item);
        }
    }
    Ok(out)
}

/// `vrank recommend`.
pub async fn run_recommend(config: &Config, req: &RecommendRequest) -> Result<()> {
    let pool = db::open(config).await?;
    let items = recommend(&pool, req).await?;
    pool.close().await;

    crate::get::print_ranked(&items);
    Ok(())
}

/// `vrank similarity`: the pairwise user similarity table.
pub async fn run_similarity(config: &Config) -> Result<()> {
    let pool = db::open(config).await?;
    let matrix = load_interest_matrix(&pool).await?;
    pool.close().await;

    if matrix.users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    println!(
        "{} users x {} items",
        matrix.users.len(),
        matrix.items.len()
    );
    let sims = matrix.similarity_matrix();
    print!("{:>8}", "");
    for id in sims.keys() {
        print!(" {:>8}", id);
    }
    println!();
    for (a, row) in &sims {
        print!("{:>8}", a);
        for sim in row.values() {
            print!(" {:>8.3}", sim);
        }
        println!();
    }
    Ok(())
}
