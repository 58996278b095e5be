//! Core data models used throughout vocarank.
//!
//! These types represent the records that flow through the refresh pipeline
//! (fetched → classified → stored) and the rows read back by queries and the
//! recommender.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse bucket assigned to every item at ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Synthesized-voice partition.
    Vocaloid,
    /// Chinese-language music.
    Chinese,
    /// Generic bucket.
    Other,
    /// Generic bucket, English-language content.
    OtherEnglish,
}

impl Category {
    /// Display label stored in the `items.category` column.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Vocaloid => "VOCALOID·UTAU",
            Category::Chinese => "华语",
            Category::Other => "其他",
            Category::OtherEnglish => "其他-英文",
        }
    }

    /// Parse a stored label. Unknown labels fall back to [`Category::Other`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "VOCALOID·UTAU" => Category::Vocaloid,
            "华语" => Category::Chinese,
            "其他-英文" => Category::OtherEnglish,
            _ => Category::Other,
        }
    }

    pub fn all() -> [Category; 4] {
        [
            Category::Vocaloid,
            Category::Chinese,
            Category::Other,
            Category::OtherEnglish,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalized record produced by the fetcher, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub bvid: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    /// Seconds; `0` means unknown.
    pub duration_secs: i64,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub partition_id: i64,
}

/// A classified record ready to be upserted. `crawl_time` is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub bvid: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub duration_secs: i64,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub category: Category,
    pub partition_id: i64,
}

impl NewItem {
    /// Tags joined the way they are persisted.
    pub fn joined_tags(&self) -> String {
        self.tags.join(",")
    }
}

/// A stored item row.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub bvid: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub duration: i64,
    /// Comma-joined tag list.
    pub tags: String,
    pub view_count: i64,
    pub category: Category,
    pub partition_id: i64,
    /// Unix seconds of the last write.
    pub crawl_time: i64,
}

/// JSON shape of an item, shared by every read endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub bvid: String,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub duration: i64,
    pub tags: String,
    pub view_count: i64,
    pub category: String,
    pub partition_id: i64,
    pub crawl_time: String, // ISO8601
}

impl From<&Item> for ItemResponse {
    fn from(item: &Item) -> Self {
        Self {
            bvid: item.bvid.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            cover_url: item.cover_url.clone(),
            duration: item.duration,
            tags: item.tags.clone(),
            view_count: item.view_count,
            category: item.category.label().to_string(),
            partition_id: item.partition_id,
            crawl_time: format_ts_iso(item.crawl_time),
        }
    }
}

/// Kind of a recorded user/item interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Play,
    Share,
    Comment,
}

impl InteractionKind {
    /// Interest score contributed by this kind of interaction.
    pub fn weight(&self) -> f64 {
        match self {
            InteractionKind::Like => 5.0,
            InteractionKind::Play => 3.0,
            InteractionKind::Share => 4.0,
            InteractionKind::Comment => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Play => "play",
            InteractionKind::Share => "share",
            InteractionKind::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(InteractionKind::Like),
            "play" => Some(InteractionKind::Play),
            "share" => Some(InteractionKind::Share),
            "comment" => Some(InteractionKind::Comment),
            _ => None,
        }
    }
}

/// One (user, item, kind) interaction. `created_at` is set once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    pub user_id: i64,
    pub bvid: String,
    pub kind: InteractionKind,
    pub created_at: Option<String>, // ISO8601
}

impl Interaction {
    pub fn new(user_id: i64, bvid: impl Into<String>, kind: InteractionKind) -> Self {
        Self {
            user_id,
            bvid: bvid.into(),
            kind,
            created_at: None,
        }
    }
}

/// A user's bookmark on an item, unique per (user, item).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Favorite {
    pub user_id: i64,
    pub bvid: String,
    pub created_at: String, // ISO8601
}

/// A recorded share of an item. Shares are not deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub id: i64,
    pub user_id: i64,
    pub bvid: String,
    pub share_text: String,
    pub platform: String,
    pub created_at: String, // ISO8601
}

/// Public view of a user account. Credentials never leave the `users` module.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub created_at: String,         // ISO8601
    pub last_login: Option<String>, // ISO8601
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}
