use axum::{
    Router,
    routing::{get, post, delete},
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::api::websocket::websocket_handler;
use crate::config::{AppConfig, ServerConfig};
use crate::hub::HubHandle;
use crate::ingestion::coordinator::{CycleCoordinator, TriggerOutcome};
use crate::ledger::store::LedgerStore;
use crate::observability::metrics::REGISTRY;
use crate::pricing::view::DerivedItemView;
use crate::types::ids::{CycleId, ItemId};

pub struct ApiState {
    pub store: Arc<LedgerStore>,
    pub hub: HubHandle,
    pub coordinator: Arc<CycleCoordinator>,
    pub config: AppConfig,
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    let cors = cors_layer(&state.config.server);
    Router::new()
        .route("/api/items", get(get_items))
        .route("/api/items/:id", delete(delete_item))
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    if server.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Synchronous pull of the current derived views, used for initial page
/// load. Bypasses the hub entirely.
async fn get_items(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<DerivedItemView>>, StatusCode> {
    state
        .store
        .query_derived_views(
            state.config.aggregation.reference_lag(),
            state.config.aggregation.view_limit,
        )
        .map(Json)
        .map_err(|e| {
            error!("Failed to query derived views: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn delete_item(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> StatusCode {
    match state.store.delete_item(ItemId(id)) {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("Failed to delete item {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(serde::Serialize)]
struct RefreshResponse {
    accepted: bool,
    status: &'static str,
    cycle_id: Option<CycleId>,
    timestamp: DateTime<Utc>,
}

/// Non-blocking kick of an ingestion cycle. Idempotent while a cycle is in
/// flight: the second caller is told "already running" instead of starting
/// a concurrent cycle.
async fn trigger_refresh(State(state): State<Arc<ApiState>>) -> Json<RefreshResponse> {
    let response = match state.coordinator.trigger() {
        TriggerOutcome::Started(cycle_id) => RefreshResponse {
            accepted: true,
            status: "refresh_started",
            cycle_id: Some(cycle_id),
            timestamp: Utc::now(),
        },
        TriggerOutcome::AlreadyRunning => RefreshResponse {
            accepted: false,
            status: "already_running",
            cycle_id: None,
            timestamp: Utc::now(),
        },
    };
    Json(response)
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    time: DateTime<Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        time: Utc::now(),
    })
}

async fn metrics() -> Result<String, StatusCode> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
