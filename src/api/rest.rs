// =============================================================================
// Admin HTTP Surface — Axum 0.7 (§6)
// =============================================================================
//
// `GET /health` is public; everything else requires a valid Bearer token via
// the `AuthBearer` extractor (kept verbatim from the teacher's `api/auth.rs`).
// CORS stays permissive the way the teacher's dashboard router configured
// it — tighten `allowed_origins` before exposing this outside a trusted
// network.
//
// Request bodies mirror the `scheduler_settings` row (§6): `PUT
// /settings/{platform}` accepts a partial update and re-validates
// `frequency_hours` against the same [0.5, 24] bound `ResolvedConfig::validate`
// enforces elsewhere, returning 400 rather than silently clamping (§8
// scenario 6).
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::store::models::SchedulerSettingRow;
use crate::types::Platform;

/// Build the full admin HTTP router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/settings", get(list_settings))
        .route("/settings/:platform", get(get_setting).put(update_setting))
        .route("/settings/:platform/enable", post(enable_setting))
        .route("/settings/:platform/disable", post(disable_setting))
        .route("/stats", get(stats))
        .layer(cors)
        .with_state(state)
}

fn parse_platform(raw: &str) -> Result<Platform, (StatusCode, Json<serde_json::Value>)> {
    Platform::parse(raw).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown platform '{raw}'") })),
        )
    })
}

fn err_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_seconds: state.uptime_seconds(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Settings — GET /settings, GET/PUT /settings/{platform}
// =============================================================================

async fn list_settings(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let rows = state
        .store
        .list_scheduler_settings()
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(rows))
}

async fn get_setting(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let platform = parse_platform(&platform)?;
    let row = state
        .store
        .get_scheduler_setting(platform)
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| err_response(StatusCode::NOT_FOUND, "no scheduler setting for this platform yet"))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
struct SettingUpdate {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    frequency_hours: Option<f64>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

async fn update_setting(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let platform = parse_platform(&platform)?;

    if let Some(hours) = update.frequency_hours {
        if !(0.5..=24.0).contains(&hours) {
            return Err(err_response(
                StatusCode::BAD_REQUEST,
                format!("frequency_hours {hours} outside [0.5, 24]"),
            ));
        }
    }

    let mut row = state
        .store
        .get_scheduler_setting(platform)
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .unwrap_or_else(|| SchedulerSettingRow::defaults(platform, state.config.frequency_hours));

    if let Some(enabled) = update.enabled {
        row.enabled = enabled;
    }
    if let Some(hours) = update.frequency_hours {
        row.frequency_hours = hours;
    }
    if let Some(metadata) = update.metadata {
        row.metadata = metadata;
    }
    // §3 "after any update, next_run_at = (last_run_at or now) + frequency_hours".
    row.recompute_next_run();

    state
        .store
        .upsert_scheduler_setting(&row)
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(platform = platform.as_str(), "scheduler setting updated via admin API");
    Ok(Json(row))
}

async fn enable_setting(
    auth: AuthBearer,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    toggle_setting(auth, state, path, true).await
}

async fn disable_setting(
    auth: AuthBearer,
    state: State<Arc<AppState>>,
    path: Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    toggle_setting(auth, state, path, false).await
}

async fn toggle_setting(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    enabled: bool,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let platform = parse_platform(&platform)?;

    let mut row = state
        .store
        .get_scheduler_setting(platform)
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .unwrap_or_else(|| SchedulerSettingRow::defaults(platform, state.config.frequency_hours));

    row.enabled = enabled;
    row.recompute_next_run();

    state
        .store
        .upsert_scheduler_setting(&row)
        .await
        .map_err(|e| err_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    warn!(platform = platform.as_str(), enabled, "scheduler setting toggled via admin API");
    Ok(Json(row))
}

// =============================================================================
// Stats — GET /stats
// =============================================================================

#[derive(Serialize)]
struct StatsResponse {
    uptime_seconds: i64,
    proxy_pool_size: usize,
    proxies: Vec<crate::proxy::entry::ProxyEntrySnapshot>,
    metrics_text: String,
}

async fn stats(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatsResponse {
        uptime_seconds: state.uptime_seconds(),
        proxy_pool_size: state.proxy_pool.len(),
        proxies: state.proxy_pool.snapshots(),
        metrics_text: state.metrics_handle.render(),
    })
}
