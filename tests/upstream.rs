//! `RankingClient` against a local axum stand-in for the ranking API.

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use tempfile::TempDir;

use vocarank::config::UpstreamConfig;
use vocarank::error::FetchError;
use vocarank::fetch::RankingClient;

async fn ranking(
    Path(mode): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match mode.as_str() {
        "ok" => Json(json!({
            "code": 0,
            "message": "0",
            "data": {
                "list": [
                    {
                        "bvid": "BV1",
                        "title": format!("first in {}", params.get("rid").cloned().unwrap_or_default()),
                        "author": "alpha",
                        "play": 100,
                        "duration": "3:00",
                        "tags": [{"tag_name": "VOCALOID"}]
                    },
                    {"title": "no id here", "play": 50},
                    {
                        "bvid": "BV2",
                        "title": "second",
                        "owner": {"name": "beta"},
                        "stat": {"view": "42"},
                        "duration": 61
                    }
                ]
            }
        }))
        .into_response(),
        "status" => (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response(),
        "code" => Json(json!({"code": -352, "message": "risk control"})).into_response(),
        "text" => "<html>captcha</html>".into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn detail(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let bvid = params.get("bvid").cloned().unwrap_or_default();
    Json(match bvid.as_str() {
        "BVroot" => json!({
            "bvid": "BVroot",
            "title": "root layout",
            "owner": {"name": "gamma"},
            "stat": {"view": 7},
            "duration": 61
        }),
        "BVgone" => json!({"code": -404, "message": "not found"}),
        _ => json!({
            "code": 0,
            "data": {
                "bvid": bvid,
                "title": "detail layout",
                "owner": {"name": "delta"},
                "pic": "http://img.example/cover.jpg",
                "stat": {"view": 5000},
                "duration": 245,
                "tid": 29
            }
        }),
    })
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/{mode}/ranking", get(ranking))
        .route("/view", get(detail));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn upstream(addr: SocketAddr, mode: &str) -> UpstreamConfig {
    UpstreamConfig {
        ranking_url: format!("http://{}/{}/ranking", addr, mode),
        detail_url: format!("http://{}/view", addr),
        timeout_secs: 2,
        request_delay_ms: 0,
        ..UpstreamConfig::default()
    }
}

#[tokio::test]
async fn test_fetch_decodes_nested_list_and_skips_entries_without_id() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "ok")).unwrap();

    let items = client.fetch(30, 10).await;
    assert_eq!(items.len(), 2);

    assert_eq!(items[0].bvid, "BV1");
    assert_eq!(items[0].title, "first in 30");
    assert_eq!(items[0].view_count, 100);
    assert_eq!(items[0].duration_secs, 180);
    assert_eq!(items[0].tags, vec!["VOCALOID".to_string()]);
    assert_eq!(items[0].partition_id, 30);

    assert_eq!(items[1].bvid, "BV2");
    assert_eq!(items[1].author, "beta");
    assert_eq!(items[1].view_count, 42);
    assert_eq!(items[1].duration_secs, 61);
}

#[tokio::test]
async fn test_fetch_truncates_to_limit() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "ok")).unwrap();

    let items = client.fetch(30, 1).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].bvid, "BV1");
}

#[tokio::test]
async fn test_error_status_degrades_to_empty() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "status")).unwrap();

    assert!(client.fetch(30, 10).await.is_empty());
    match client.try_fetch(30, 10).await {
        Err(FetchError::Status { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_nonzero_code_degrades_to_empty() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "code")).unwrap();

    assert!(client.fetch(30, 10).await.is_empty());
    match client.try_fetch(30, 10).await {
        Err(FetchError::Upstream { code, message }) => {
            assert_eq!(code, -352);
            assert_eq!(message, "risk control");
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_body_degrades_to_empty() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "text")).unwrap();

    assert!(client.fetch(30, 10).await.is_empty());
    assert!(matches!(
        client.try_fetch(30, 10).await,
        Err(FetchError::Json(_))
    ));
}

#[tokio::test]
async fn test_detail_under_data() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "ok")).unwrap();

    let item = client.fetch_detail("BVdata").await.unwrap();
    assert_eq!(item.bvid, "BVdata");
    assert_eq!(item.author, "delta");
    assert_eq!(item.view_count, 5000);
    assert_eq!(item.duration_secs, 245);
    assert_eq!(item.partition_id, 29);
}

#[tokio::test]
async fn test_detail_at_document_root() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "ok")).unwrap();

    let item = client.fetch_detail("BVroot").await.unwrap();
    assert_eq!(item.title, "root layout");
    assert_eq!(item.view_count, 7);
    assert_eq!(item.duration_secs, 61);
    assert_eq!(item.partition_id, 0);
}

#[tokio::test]
async fn test_detail_error_envelope_is_none() {
    let addr = spawn_upstream().await;
    let client = RankingClient::new(&upstream(addr, "ok")).unwrap();

    assert!(client.fetch_detail("BVgone").await.is_none());
}

#[tokio::test]
async fn test_fetch_details_overlays_detail_counters() {
    let addr = spawn_upstream().await;
    let mut config = upstream(addr, "ok");
    config.fetch_details = true;
    let client = RankingClient::new(&config).unwrap();

    let items = client.fetch(30, 10).await;
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.view_count, 5000);
        assert_eq!(item.duration_secs, 245);
        assert_eq!(item.cover_url.as_deref(), Some("http://img.example/cover.jpg"));
        // The ranking partition is kept.
        assert_eq!(item.partition_id, 30);
    }
    assert_eq!(items[0].tags, vec!["VOCALOID".to_string()]);
}

#[tokio::test]
async fn test_dump_dir_receives_raw_responses() {
    let addr = spawn_upstream().await;
    let tmp = TempDir::new().unwrap();
    let mut config = upstream(addr, "ok");
    config.dump_dir = Some(tmp.path().join("dumps"));
    let client = RankingClient::new(&config).unwrap();

    client.fetch(190, 10).await;
    client.fetch_detail("BVroot").await;

    let ranking = std::fs::read_to_string(tmp.path().join("dumps/ranking_190_response.json")).unwrap();
    let doc: Value = serde_json::from_str(&ranking).unwrap();
    assert_eq!(doc["code"], 0);
    assert!(tmp.path().join("dumps/detail_BVroot_response.json").exists());
}
