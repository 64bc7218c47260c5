// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The surface is read-only snapshots
// plus subscription control — the engine never calls into a renderer; the
// dashboard pulls from here (or listens on the WebSocket feed).
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::types::{CandleKey, Interval};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/sessions", get(sessions))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/subscribe", post(subscribe))
        .route("/api/v1/unsubscribe", post(unsubscribe))
        // ── WebSocket (handled in the ws module but mounted here) ────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Shared request/response shapes
// =============================================================================

/// `?symbol=BTCUSDT&interval=1m` — shared by snapshot requests, and the body
/// of the subscribe/unsubscribe posts.
#[derive(Debug, Deserialize)]
struct SessionSelector {
    symbol: String,
    interval: String,
}

impl SessionSelector {
    fn key(&self) -> Result<CandleKey, (StatusCode, String)> {
        let interval = Interval::from_str(&self.interval)
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        Ok(CandleKey {
            symbol: self.symbol.to_uppercase(),
            interval,
        })
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Sessions
// =============================================================================

async fn sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let keys = state.session_keys();
    Json(keys)
}

// =============================================================================
// Snapshot
// =============================================================================

async fn snapshot(
    State(state): State<Arc<AppState>>,
    Query(selector): Query<SessionSelector>,
) -> impl IntoResponse {
    let key = match selector.key() {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    match state.snapshot(&key) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no session for {key}") })),
        )
            .into_response(),
    }
}

// =============================================================================
// Subscription control
// =============================================================================

async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(selector): Json<SessionSelector>,
) -> impl IntoResponse {
    let key = match selector.key() {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    info!(key = %key, "subscribe requested");
    match state.subscribe(&key.symbol, key.interval).await {
        Ok(()) => Json(serde_json::json!({ "subscribed": key.to_string() })).into_response(),
        Err(e) => {
            warn!(key = %key, error = %e, "subscribe failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(selector): Json<SessionSelector>,
) -> impl IntoResponse {
    let key = match selector.key() {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    if state.unsubscribe(&key) {
        Json(serde_json::json!({ "unsubscribed": key.to_string() })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no session for {key}") })),
        )
            .into_response()
    }
}
