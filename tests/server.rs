//! HTTP API tests driven through the router with `oneshot`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use vocarank::config::Config;
use vocarank::db;
use vocarank::ingest::RefreshGuard;
use vocarank::models::{Category, FetchedItem, NewItem};
use vocarank::server::{build_router, AppState};
use vocarank::store;
use vocarank::traits::RankingSource;
use vocarank::writer::StoreWriter;

struct FixedSource(Vec<FetchedItem>);

#[async_trait]
impl RankingSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch(&self, partition_id: i64, limit: usize) -> Vec<FetchedItem> {
        self.0
            .iter()
            .filter(|i| i.partition_id == partition_id)
            .take(limit)
            .cloned()
            .collect()
    }

    async fn fetch_detail(&self, bvid: &str) -> Option<FetchedItem> {
        self.0.iter().find(|i| i.bvid == bvid).cloned()
    }
}

fn fetched(bvid: &str, partition_id: i64, views: i64) -> FetchedItem {
    FetchedItem {
        bvid: bvid.to_string(),
        title: format!("title {}", bvid),
        author: "author".to_string(),
        cover_url: None,
        duration_secs: 200,
        tags: vec!["VOCALOID".to_string()],
        view_count: views,
        partition_id,
    }
}

fn new_item(bvid: &str, views: i64) -> NewItem {
    NewItem {
        bvid: bvid.to_string(),
        title: format!("title {}", bvid),
        author: "author".to_string(),
        cover_url: None,
        duration_secs: 200,
        tags: vec!["Miku".to_string()],
        view_count: views,
        category: Category::Vocaloid,
        partition_id: 30,
    }
}

struct TestApp {
    _tmp: TempDir,
    state: AppState,
}

impl TestApp {
    async fn new(source: Vec<FetchedItem>) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::with_db_path(tmp.path().join("vrank.sqlite"));
        config.upstream.request_delay_ms = 0;
        config.scheduler.enabled = false;
        config.retention.backup_dir = tmp.path().join("backups");

        let pool = db::open(&config).await.unwrap();
        let (writer, _task) = StoreWriter::spawn(pool.clone());
        let state = AppState {
            pool,
            config: Arc::new(config),
            writer,
            source: Arc::new(FixedSource(source)),
            guard: RefreshGuard::new(),
        };
        Self { _tmp: tmp, state }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Should read body");
        (status, bytes.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
    }

    async fn send_raw(&self, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(vec![]).await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_refresh_then_list() {
    let app = TestApp::new(vec![fetched("BV1", 30, 10), fetched("BV2", 30, 20)]).await;

    let (status, body) = app
        .post("/api/refresh", json!({ "partitions": [30], "limit": 5, "force_update": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_fetched"], 2);
    assert_eq!(body["data"]["total_saved"], 2);
    assert!(body["data"]["fetch_time"].is_string());

    let (status, body) = app.get("/api/videos?sort_by=views&limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["bvid"], "BV2");
    assert_eq!(list[0]["category"], "VOCALOID·UTAU");
}

#[tokio::test]
async fn test_refresh_with_empty_body_uses_config_defaults() {
    let app = TestApp::new(vec![fetched("BV1", 30, 10)]).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/refresh")
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["total_fetched"], 1);
}

#[tokio::test]
async fn test_refresh_in_progress_is_rejected() {
    let app = TestApp::new(vec![fetched("BV1", 30, 10)]).await;
    let _permit = app.state.guard.try_acquire().unwrap();

    let (status, body) = app.post("/api/refresh", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "refresh_in_progress");
    assert_eq!(store::count_items(&app.state.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_get_video_and_not_found() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 5)], true)
        .await
        .unwrap();

    let (status, body) = app.get("/api/videos/BV1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bvid"], "BV1");
    assert_eq!(body["tags"], "Miku");

    let (status, body) = app.get("/api/videos/BVmissing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_unknown_sort_falls_back_to_views() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 5), new_item("BV2", 50)], true)
        .await
        .unwrap();

    let (status, body) = app.get("/api/videos?sort_by=likes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["bvid"], "BV2");
}

#[tokio::test]
async fn test_recommend_with_search_and_random() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(
        &app.state.pool,
        &[new_item("BV1", 1), new_item("BV2", 2), new_item("BV3", 3)],
        true,
    )
    .await
    .unwrap();

    let (status, body) = app.get("/api/recommend?limit=10&random=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = app.get("/api/recommend?q=nomatch").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = app.get("/api/recommend?q=MIKU&time_range=week").await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_history_and_bad_date() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1), new_item("BV2", 9)], true)
        .await
        .unwrap();

    let (status, body) = app.get("/api/rankings/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["ranking"], 1);
    assert_eq!(body["data"][0]["bvid"], "BV2");

    let (status, body) = app.get("/api/rankings/history?date=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_stats() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();

    let (status, body) = app.get("/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 1);
    assert_eq!(body["most_viewed"]["bvid"], "BV1");
    assert_eq!(body["by_category"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_cleanup_validates_days() {
    let app = TestApp::new(vec![]).await;
    let (status, _) = app.post("/api/cleanup", json!({ "days": 0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/cleanup", json!({ "days": 30, "backup": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items_deleted"], 0);
    assert!(body["data"]["backup_file"].is_null());
}

#[tokio::test]
async fn test_export_csv() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();
    let today = chrono::Local::now().date_naive();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/export?start={}&end={}&format=csv", today, today))
        .body(Body::empty())
        .unwrap();
    let (status, bytes) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("ranking,bvid"));
    assert!(text.contains("1,BV1,"));

    let (status, _) = app.get("/api/export?start=2025-02-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_and_interactions() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();

    let (status, user) = app
        .post(
            "/api/users",
            json!({ "username": "dana", "email": "dana@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = user["id"].as_i64().unwrap();
    assert!(user.get("password_hash").is_none());

    let (status, body) = app
        .post(
            "/api/users",
            json!({ "username": "dana", "email": "other@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = app
        .post("/api/users/login", json!({ "username": "dana", "password": "nope" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/users/login", json!({ "username": "dana", "password": "pw" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["last_login"].is_string());

    let (status, body) = app
        .post(
            "/api/interactions",
            json!({ "user_id": user_id, "bvid": "BV1", "kind": "like" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app
        .post(
            "/api/interactions",
            json!({ "user_id": user_id, "bvid": "BV1", "kind": "bookmark" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/interactions",
            json!({ "user_id": 9999, "bvid": "BV1", "kind": "play" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_random_recommend_is_limited_and_distinct() {
    let app = TestApp::new(vec![]).await;
    let items: Vec<NewItem> = (1..=6).map(|i| new_item(&format!("BV{}", i), i)).collect();
    store::upsert_items(&app.state.pool, &items, true).await.unwrap();

    let (status, body) = app.get("/api/recommend?random=true&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_ne!(list[0]["bvid"], list[1]["bvid"]);
}

#[tokio::test]
async fn test_recommend_huge_limit_is_clamped() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();

    let uri = format!("/api/recommend?random=true&limit={}", i64::MAX);
    let (status, body) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_rejects_oversized_days_and_keeps_data() {
    let app = TestApp::new(vec![fetched("BV2", 30, 20)]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();

    let (status, body) = app
        .post(
            "/api/cleanup",
            json!({ "days": 160127986750950i64, "backup": false }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(store::count_items(&app.state.pool).await.unwrap(), 1);

    // The writer is still alive.
    let (status, body) = app
        .post("/api/refresh", json!({ "partitions": [30], "force_update": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_saved"], 1);
    assert!(body["data"]["failed_partitions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let app = TestApp::new(vec![]).await;
    for uri in [
        "/api/users",
        "/api/users/login",
        "/api/interactions",
        "/api/shares",
        "/api/users/1/favorites",
    ] {
        let (status, body) = app.send_raw("POST", uri, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "bad_request", "{}", uri);
    }

    let (status, body) = app
        .post("/api/users", json!({ "username": "no-password" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_favorites_shares_and_friends() {
    let app = TestApp::new(vec![]).await;
    store::upsert_items(&app.state.pool, &[new_item("BV1", 1)], true)
        .await
        .unwrap();

    let mut ids = Vec::new();
    for name in ["kim", "lee", "max"] {
        let (status, user) = app
            .post(
                "/api/users",
                json!({ "username": name, "email": format!("{}@example.com", name), "password": "pw" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(user["id"].as_i64().unwrap());
    }
    let me = ids[0];

    let uri = format!("/api/users/{}/favorites", me);
    let (status, body) = app.post(&uri, json!({ "bvid": "BV1" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let (_, body) = app.post(&uri, json!({ "bvid": "BV1" })).await;
    assert_eq!(body["changed"], false);

    let (status, body) = app.post(&uri, json!({ "bvid": "BVmissing" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = app.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["bvid"], "BV1");

    let (status, body) = app
        .post(
            "/api/shares",
            json!({ "user_id": me, "bvid": "BV1", "share_text": "great", "platform": "weibo" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["platform"], "weibo");

    let (_, stats) = app.get("/api/stats").await;
    assert_eq!(stats["total_favorites"], 1);
    assert_eq!(stats["total_shares"], 1);

    let (status, body) = app
        .send_raw("DELETE", &format!("/api/users/{}/favorites/BV1", me), "")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    let (_, body) = app.get(&uri).await;
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = app
        .get(&format!("/api/recommend/users?user_id={}&limit=5", me))
        .await;
    assert_eq!(status, StatusCode::OK);
    let friends = body.as_array().unwrap();
    assert_eq!(friends.len(), 2);
    assert!(friends.iter().all(|u| u["id"].as_i64() != Some(me)));

    let (status, _) = app.get("/api/recommend/users").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/recommend/users?user_id=9999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
