//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/refresh` | Run one refresh now |
//! | `GET`  | `/api/videos` | Ranked, filtered item list |
//! | `GET`  | `/api/videos/{bvid}` | One item |
//! | `GET`  | `/api/recommend` | Popular or random recommendations |
//! | `GET`  | `/api/rankings/history` | Items crawled on one day |
//! | `GET`  | `/api/stats` | Database statistics |
//! | `POST` | `/api/cleanup` | Retention pass with optional backup |
//! | `GET`  | `/api/export` | JSON or CSV export of a date range |
//! | `POST` | `/api/users` | Register |
//! | `POST` | `/api/users/login` | Log in |
//! | `POST` | `/api/interactions` | Record a user/item interaction |
//! | `GET`  | `/api/users/{id}/favorites` | A user's favorites |
//! | `POST` | `/api/users/{id}/favorites` | Add a favorite |
//! | `DELETE` | `/api/users/{id}/favorites/{bvid}` | Remove a favorite |
//! | `POST` | `/api/shares` | Record a share |
//! | `GET`  | `/api/recommend/users` | Potential friends for a user |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid date" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `refresh_in_progress` (409), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db;
use crate::error::UserError;
use crate::export::{self, ExportFormat};
use crate::fetch::RankingClient;
use crate::ingest::{run_refresh, RefreshGuard, RefreshReport, RefreshRequest};
use crate::models::{Favorite, Interaction, InteractionKind, ItemResponse, Share, User};
use crate::recommend::{self, RecommendRequest};
use crate::scheduler::{Scheduler, SchedulerContext};
use crate::social::{self, NewShare};
use crate::stats::{self, DbStats};
use crate::store::{self, CleanupReport, ItemQuery, SortField, TimeRange, MAX_RETENTION_DAYS};
use crate::traits::RankingSource;
use crate::users::{self, NewUser};
use crate::writer::StoreWriter;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub writer: StoreWriter,
    pub source: Arc<dyn RankingSource>,
    pub guard: RefreshGuard,
}

/// Build the router. Separate from [`run_server`] so tests can drive it
/// with `tower::ServiceExt::oneshot`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/refresh", post(handle_refresh))
        .route("/api/videos", get(handle_list_videos))
        .route("/api/videos/{bvid}", get(handle_get_video))
        .route("/api/recommend", get(handle_recommend))
        .route("/api/rankings/history", get(handle_history))
        .route("/api/stats", get(handle_stats))
        .route("/api/cleanup", post(handle_cleanup))
        .route("/api/export", get(handle_export))
        .route("/api/users", post(handle_register))
        .route("/api/users/login", post(handle_login))
        .route("/api/interactions", post(handle_interaction))
        .route(
            "/api/users/{id}/favorites",
            get(handle_list_favorites).post(handle_add_favorite),
        )
        .route(
            "/api/users/{id}/favorites/{bvid}",
            delete(handle_remove_favorite),
        )
        .route("/api/shares", post(handle_share))
        .route("/api/recommend/users", get(handle_potential_friends))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server, plus the scheduler when enabled.
///
/// Runs until Ctrl-C, then stops the scheduler and drains the writer.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let pool = db::open(&config).await?;
    let (writer, writer_task) = StoreWriter::spawn(pool.clone());
    let source: Arc<dyn RankingSource> = Arc::new(RankingClient::new(&config.upstream)?);
    let guard = RefreshGuard::new();

    let scheduler = if config.scheduler.enabled {
        let ctx = SchedulerContext {
            source: Arc::clone(&source),
            writer: writer.clone(),
            guard: guard.clone(),
        };
        Some(Scheduler::start(
            ctx,
            RefreshRequest::from_config(&config),
            Duration::from_secs(config.scheduler.interval_secs),
        ))
    } else {
        None
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        writer,
        source,
        guard,
    };
    let app = build_router(state);

    println!("vocarank listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;

    tracing::info!("shutting down");
    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    // Router (and its writer handles) are gone; the writer drains and exits.
    let _ = writer_task.await;
    pool.close().await;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn refresh_in_progress() -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "refresh_in_progress",
        message: "a refresh is already running".to_string(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: err.to_string(),
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Db(e) => anyhow::Error::from(e).into(),
            e @ (UserError::UnknownUser(_) | UserError::UnknownItem(_)) => {
                not_found(e.to_string())
            }
            other => bad_request(other.to_string()),
        }
    }
}

/// Parse an optional JSON body; an empty body yields the default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    parse_json(body)
}

/// Parse a required JSON body, rejecting malformed input with the error
/// envelope rather than axum's plain-text rejection.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| bad_request(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/refresh ============

#[derive(Debug, Default, Deserialize)]
struct RefreshBody {
    partitions: Option<Vec<i64>>,
    limit: Option<usize>,
    force_update: Option<bool>,
}

/// Answers 409 instead of queueing when another refresh holds the guard.
async fn handle_refresh(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Envelope<RefreshReport>>, AppError> {
    let body: RefreshBody = parse_body(&body)?;

    let Some(_permit) = state.guard.try_acquire() else {
        return Err(refresh_in_progress());
    };

    let mut req = RefreshRequest::from_config(&state.config);
    if let Some(partitions) = body.partitions {
        if partitions.is_empty() {
            return Err(bad_request("partitions must not be empty"));
        }
        req.partitions = partitions;
    }
    if let Some(limit) = body.limit {
        req.limit = limit;
    }
    if let Some(force) = body.force_update {
        req.force_update = force;
    }

    let report = run_refresh(state.source.as_ref(), &state.writer, &req).await;
    Ok(success(report))
}

// ============ GET /api/videos ============

#[derive(Debug, Deserialize)]
struct VideosParams {
    sort_by: Option<String>,
    limit: Option<i64>,
    time_range: Option<String>,
    partition: Option<i64>,
}

async fn handle_list_videos(
    State(state): State<AppState>,
    Query(params): Query<VideosParams>,
) -> Result<Json<Vec<ItemResponse>>, AppError> {
    let query = ItemQuery {
        sort: SortField::parse(params.sort_by.as_deref().unwrap_or("views")),
        time_range: TimeRange::parse(params.time_range.as_deref().unwrap_or("all")),
        partition: params.partition,
        limit: state.config.retrieval.clamp_limit(params.limit),
    };
    let items = store::query_items(&state.pool, &query).await?;
    Ok(Json(items.iter().map(ItemResponse::from).collect()))
}

async fn handle_get_video(
    State(state): State<AppState>,
    Path(bvid): Path<String>,
) -> Result<Json<ItemResponse>, AppError> {
    let item = store::get_item(&state.pool, &bvid)
        .await?
        .ok_or_else(|| not_found(format!("item not found: {}", bvid)))?;
    Ok(Json(ItemResponse::from(&item)))
}

// ============ GET /api/recommend ============

#[derive(Debug, Deserialize)]
struct RecommendParams {
    user_id: Option<i64>,
    limit: Option<i64>,
    time_range: Option<String>,
    q: Option<String>,
    random: Option<bool>,
}

async fn handle_recommend(
    State(state): State<AppState>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<Vec<ItemResponse>>, AppError> {
    let req = RecommendRequest {
        user_id: params.user_id,
        limit: state.config.retrieval.resolve_recommend_limit(params.limit),
        time_range: TimeRange::parse(params.time_range.as_deref().unwrap_or("all")),
        search_query: params.q,
        randomize: params.random.unwrap_or(false),
    };
    let items = recommend::recommend(&state.pool, &req).await?;
    Ok(Json(items.iter().map(ItemResponse::from).collect()))
}

// ============ GET /api/rankings/history ============

#[derive(Debug, Deserialize)]
struct HistoryParams {
    date: Option<String>,
}

#[derive(Serialize)]
struct RankedItem {
    ranking: usize,
    #[serde(flatten)]
    item: ItemResponse,
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    date: String,
    count: usize,
    data: Vec<RankedItem>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let date = match params.date.as_deref() {
        Some(s) => parse_date(s)?,
        None => chrono::Local::now().date_naive(),
    };
    let items = store::historical_ranking(&state.pool, date).await?;

    let data: Vec<RankedItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| RankedItem {
            ranking: i + 1,
            item: item.into(),
        })
        .collect();

    Ok(Json(HistoryResponse {
        success: true,
        date: date.to_string(),
        count: data.len(),
        data,
    }))
}

// ============ GET /api/stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<DbStats>, AppError> {
    Ok(Json(stats::collect_stats(&state.pool).await?))
}

// ============ POST /api/cleanup ============

#[derive(Debug, Default, Deserialize)]
struct CleanupBody {
    days: Option<i64>,
    backup: Option<bool>,
}

async fn handle_cleanup(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Envelope<CleanupReport>>, AppError> {
    let body: CleanupBody = parse_body(&body)?;
    let days = body.days.unwrap_or(state.config.retention.days_to_keep);
    if !(1..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(bad_request(format!(
            "days must be between 1 and {}",
            MAX_RETENTION_DAYS
        )));
    }
    let backup_dir = body
        .backup
        .unwrap_or(true)
        .then(|| state.config.retention.backup_dir.clone());

    let report = state.writer.cleanup(days, backup_dir).await?;
    Ok(success(report))
}

// ============ GET /api/export ============

#[derive(Debug, Deserialize)]
struct ExportParams {
    start: Option<String>,
    end: Option<String>,
    format: Option<String>,
}

async fn handle_export(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let start = parse_date(
        params
            .start
            .as_deref()
            .ok_or_else(|| bad_request("start is required"))?,
    )?;
    let end = parse_date(
        params
            .end
            .as_deref()
            .ok_or_else(|| bad_request("end is required"))?,
    )?;
    if end < start {
        return Err(bad_request("end must not be before start"));
    }
    let format = ExportFormat::parse(params.format.as_deref().unwrap_or("json"))
        .map_err(|e| bad_request(e.to_string()))?;

    let body = export::export_range(&state.pool, start, end, format).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

// ============ Users ============

#[derive(Debug, Deserialize)]
struct RegisterBody {
    username: String,
    email: String,
    password: String,
    #[serde(default)]
    bio: String,
}

async fn handle_register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<User>), AppError> {
    let body: RegisterBody = parse_json(&body)?;
    let user = users::register(
        &state.pool,
        &NewUser {
            username: body.username,
            email: body.email,
            password: body.password,
            bio: body.bio,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<User>, AppError> {
    let body: LoginBody = parse_json(&body)?;
    Ok(Json(
        users::login(&state.pool, &body.username, &body.password).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct InteractionBody {
    user_id: i64,
    bvid: String,
    kind: String,
}

#[derive(Serialize)]
struct InteractionResponse {
    success: bool,
    recorded: bool,
}

async fn handle_interaction(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InteractionResponse>, AppError> {
    let body: InteractionBody = parse_json(&body)?;
    let kind = InteractionKind::parse(&body.kind).ok_or_else(|| {
        bad_request(format!(
            "unknown interaction kind '{}' (expected like, play, share, comment)",
            body.kind
        ))
    })?;
    if store::get_item(&state.pool, &body.bvid).await?.is_none() {
        return Err(not_found(format!("item not found: {}", body.bvid)));
    }

    let recorded = users::record_interaction(
        &state.pool,
        &Interaction::new(body.user_id, body.bvid, kind),
    )
    .await?;

    Ok(Json(InteractionResponse {
        success: true,
        recorded,
    }))
}

// ============ Favorites and shares ============

#[derive(Debug, Deserialize)]
struct FavoriteBody {
    bvid: String,
}

#[derive(Serialize)]
struct FavoriteChange {
    success: bool,
    changed: bool,
}

async fn handle_list_favorites(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Favorite>>, AppError> {
    Ok(Json(social::list_favorites(&state.pool, user_id).await?))
}

async fn handle_add_favorite(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Bytes,
) -> Result<Json<FavoriteChange>, AppError> {
    let body: FavoriteBody = parse_json(&body)?;
    let changed = social::add_favorite(&state.pool, user_id, &body.bvid).await?;
    Ok(Json(FavoriteChange {
        success: true,
        changed,
    }))
}

async fn handle_remove_favorite(
    State(state): State<AppState>,
    Path((user_id, bvid)): Path<(i64, String)>,
) -> Result<Json<FavoriteChange>, AppError> {
    let changed = social::remove_favorite(&state.pool, user_id, &bvid).await?;
    Ok(Json(FavoriteChange {
        success: true,
        changed,
    }))
}

#[derive(Debug, Deserialize)]
struct ShareBody {
    user_id: i64,
    bvid: String,
    #[serde(default)]
    share_text: String,
    platform: Option<String>,
}

async fn handle_share(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Share>), AppError> {
    let body: ShareBody = parse_json(&body)?;
    let share = social::record_share(
        &state.pool,
        &NewShare {
            user_id: body.user_id,
            bvid: body.bvid,
            share_text: body.share_text,
            platform: body.platform,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(share)))
}

// ============ GET /api/recommend/users ============

const DEFAULT_FRIEND_SUGGESTIONS: i64 = 5;

#[derive(Debug, Deserialize)]
struct FriendParams {
    user_id: Option<i64>,
    limit: Option<i64>,
}

async fn handle_potential_friends(
    State(state): State<AppState>,
    Query(params): Query<FriendParams>,
) -> Result<Json<Vec<User>>, AppError> {
    let user_id = params
        .user_id
        .ok_or_else(|| bad_request("user_id is required"))?;
    let limit = state
        .config
        .retrieval
        .clamp_limit(Some(params.limit.unwrap_or(DEFAULT_FRIEND_SUGGESTIONS)));

    let friends = social::find_potential_friends(&state.pool, user_id, limit as usize).await?;
    Ok(Json(friends))
}
