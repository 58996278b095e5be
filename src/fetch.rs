//! Upstream ranking API client.
//!
//! Fetches a partition's ranking list and per-item details from the public
//! ranking API, normalizing every entry into a [`FetchedItem`].
//!
//! # Failure policy
//!
//! Upstream failures never escape [`RankingClient::fetch`] or
//! [`RankingClient::fetch_detail`]: network errors, non-2xx statuses,
//! non-zero `code` envelopes and unrecognized layouts are logged and turn
//! into an empty list / `None`. There is no retry and no backoff. The
//! `try_*` variants return the typed [`FetchError`] instead.
//!
//! # Configuration
//!
//! ```toml
//! [upstream]
//! ranking_url = "https://api.bilibili.com/x/web-interface/ranking/region"
//! detail_url = "https://api.bilibili.com/x/web-interface/view"
//! day_window = 7
//! timeout_secs = 10
//! fetch_details = false
//! # dump_dir = "./debug"   # write raw responses for inspection
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::error::FetchError;
use crate::models::FetchedItem;
use crate::probe::{self, VideoRecord};
use crate::traits::RankingSource;

/// HTTP client for the ranking and detail endpoints.
pub struct RankingClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl RankingClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        headers.insert(REFERER, HeaderValue::from_str(&config.referer)?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    /// Fetch one ranking page for a partition.
    pub async fn try_fetch(
        &self,
        partition_id: i64,
        limit: usize,
    ) -> Result<Vec<FetchedItem>, FetchError> {
        let query = [
            ("rid", partition_id.to_string()),
            ("day", self.config.day_window.to_string()),
            ("ps", limit.to_string()),
        ];
        let label = format!("ranking_{}", partition_id);
        let doc = self.get_json(&self.config.ranking_url, &query, &label).await?;

        let decoded = probe::decode_ranking_list(&doc)?;
        tracing::debug!(
            partition_id,
            layout = decoded.variant,
            entries = decoded.value.len(),
            "decoded ranking list"
        );

        Ok(parse_ranking_entries(&decoded.value, partition_id, limit))
    }

    /// Fetch one item's detail record.
    pub async fn try_fetch_detail(&self, bvid: &str) -> Result<FetchedItem, FetchError> {
        let query = [("bvid", bvid.to_string())];
        let label = format!("detail_{}", bvid);
        let doc = self.get_json(&self.config.detail_url, &query, &label).await?;

        let decoded = probe::decode_detail(&doc)?;
        tracing::debug!(bvid, layout = decoded.variant, "decoded detail record");

        let partition_id = decoded.value.tid.unwrap_or(0);
        record_to_item(decoded.value, partition_id, Some(bvid))
            .ok_or(FetchError::NoSchemaMatched {
                tried: probe::DETAIL_PROBES.iter().map(|p| p.name).collect(),
            })
    }

    pub async fn fetch(&self, partition_id: i64, limit: usize) -> Vec<FetchedItem> {
        let mut items = match self.try_fetch(partition_id, limit).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(partition_id, error = %e, "ranking fetch failed");
                return Vec::new();
            }
        };

        if self.config.fetch_details {
            self.enrich(&mut items).await;
        }

        items
    }

    pub async fn fetch_detail(&self, bvid: &str) -> Option<FetchedItem> {
        match self.try_fetch_detail(bvid).await {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(bvid, error = %e, "detail fetch failed");
                None
            }
        }
    }

    /// Overlay detail counters onto ranking entries, pausing between calls.
    async fn enrich(&self, items: &mut [FetchedItem]) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        for (i, item) in items.iter_mut().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(detail) = self.fetch_detail(&item.bvid).await {
                merge_detail(item, detail);
            }
        }
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        label: &str,
    ) -> Result<Value, FetchError> {
        tracing::debug!(url, ?query, "upstream request");

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        let doc: Value = serde_json::from_str(&text)?;

        self.dump(label, &doc).await;
        check_envelope(&doc)?;
        Ok(doc)
    }

    async fn dump(&self, label: &str, doc: &Value) {
        let Some(dir) = &self.config.dump_dir else {
            return;
        };
        let path = dir.join(format!("{}_response.json", label));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            let body = serde_json::to_vec_pretty(doc)?;
            tokio::fs::write(&path, body).await?;
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "could not write response dump");
        }
    }
}

#[async_trait]
impl RankingSource for RankingClient {
    fn name(&self) -> &str {
        "upstream"
    }

    async fn fetch(&self, partition_id: i64, limit: usize) -> Vec<FetchedItem> {
        RankingClient::fetch(self, partition_id, limit).await
    }

    async fn fetch_detail(&self, bvid: &str) -> Option<FetchedItem> {
        RankingClient::fetch_detail(self, bvid).await
    }
}

/// Reject envelopes whose `code` is present and non-zero.
fn check_envelope(doc: &Value) -> Result<(), FetchError> {
    match doc.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => Err(FetchError::Upstream {
            code,
            message: doc
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
    }
}

/// Decode raw ranking entries, skipping ones without a usable id.
pub fn parse_ranking_entries(entries: &[Value], partition_id: i64, limit: usize) -> Vec<FetchedItem> {
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<VideoRecord>(entry.clone()) {
            Ok(record) => record_to_item(record, partition_id, None),
            Err(_) => {
                tracing::debug!(partition_id, "skipping undecodable ranking entry");
                None
            }
        })
        .take(limit)
        .collect()
}

fn record_to_item(
    record: VideoRecord,
    partition_id: i64,
    fallback_bvid: Option<&str>,
) -> Option<FetchedItem> {
    let bvid = record
        .bvid
        .clone()
        .filter(|b| !b.trim().is_empty())
        .or_else(|| fallback_bvid.map(str::to_string))?;

    Some(FetchedItem {
        title: record
            .title
            .clone()
            .unwrap_or_else(|| "(untitled)".to_string()),
        author: record
            .author_name()
            .unwrap_or_else(|| "(unknown)".to_string()),
        cover_url: record.pic.clone(),
        duration_secs: record.duration_secs(),
        tags: record.tag_list(),
        view_count: record.view_count(),
        partition_id,
        bvid,
    })
}

/// Detail values win where they are known; ranking values fill the gaps.
fn merge_detail(item: &mut FetchedItem, detail: FetchedItem) {
    if detail.view_count > 0 {
        item.view_count = detail.view_count;
    }
    if detail.duration_secs > 0 {
        item.duration_secs = detail.duration_secs;
    }
    if item.cover_url.is_none() {
        item.cover_url = detail.cover_url;
    }
    if item.tags.is_empty() {
        item.tags = detail.tags;
    }
}

/// Convert `MM:SS` or `H:MM:SS` into seconds.
///
/// Anything else (empty, no colon, non-numeric or negative parts, more than
/// three parts) yields `0`, the "unknown duration" sentinel.
pub fn parse_duration(s: &str) -> i64 {
    let s = s.trim();
    if !s.contains(':') {
        return 0;
    }

    let parts: Option<Vec<i64>> = s
        .split(':')
        .map(|p| p.trim().parse::<u32>().ok().map(i64::from))
        .collect();

    match parts.as_deref() {
        Some([m, sec]) => m * 60 + sec,
        Some([h, m, sec]) => h * 3600 + m * 60 + sec,
        _ => 0,
    }
}
