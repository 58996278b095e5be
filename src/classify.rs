//! Category assignment for fetched items.
//!
//! A pure function of (partition id, tags, title, author). The partition
//! table decides first; only items landing in the generic bucket are
//! refined by keyword matching, Chinese keywords before English ones.

use crate::models::{Category, FetchedItem, NewItem};

/// Partition id → category. Anything not listed is [`Category::Other`].
const PARTITION_TABLE: &[(i64, Category)] = &[
    (30, Category::Vocaloid),
    (29, Category::Chinese),
    (190, Category::Other),
];

/// Ordered keyword lists. The first list with a hit wins.
const KEYWORD_RULES: &[(Category, &[&str])] = &[
    (
        Category::Chinese,
        &["中文", "华语", "普通话", "粤语", "国V", "中V"],
    ),
    (Category::OtherEnglish, &["英语", "英文", "欧美"]),
];

pub fn known_partitions() -> &'static [(i64, Category)] {
    PARTITION_TABLE
}

pub fn partition_category(partition_id: i64) -> Category {
    PARTITION_TABLE
        .iter()
        .find(|(id, _)| *id == partition_id)
        .map(|(_, c)| *c)
        .unwrap_or(Category::Other)
}

pub fn classify(partition_id: i64, tags: &[String], title: &str, author: &str) -> Category {
    let category = partition_category(partition_id);
    if category != Category::Other {
        return category;
    }

    let mut haystack = String::with_capacity(title.len() + author.len() + 16);
    haystack.push_str(title);
    haystack.push(' ');
    haystack.push_str(author);
    for tag in tags {
        haystack.push(' ');
        haystack.push_str(tag);
    }
    let haystack = haystack.to_lowercase();

    for (target, keywords) in KEYWORD_RULES {
        if keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase()))
        {
            return *target;
        }
    }

    category
}

/// Attach a category to a fetched record.
pub fn classify_item(item: FetchedItem) -> NewItem {
    let category = classify(item.partition_id, &item.tags, &item.title, &item.author);
    NewItem {
        bvid: item.bvid,
        title: item.title,
        author: item.author,
        cover_url: item.cover_url,
        duration_secs: item.duration_secs,
        tags: item.tags,
        view_count: item.view_count,
        category,
        partition_id: item.partition_id,
    }
}
