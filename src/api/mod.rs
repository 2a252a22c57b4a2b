//! Read-only HTTP status API.
//!
//! Exposes the applied marker, the resolved chain and the run history.
//! Upgrades and downgrades are deliberately CLI-only.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use revchain_core::store::SchemaStore;
use revchain_core::{Chain, ChainError, HistoryEntry, RevisionId, SqliteStore, StoreError};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    chain: Arc<Chain>,
}

impl AppState {
    fn store(&self) -> Result<MutexGuard<'_, SqliteStore>, ApiError> {
        self.store
            .lock()
            .map_err(|e| ApiError::Internal(format!("store lock poisoned: {}", e)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Chain(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!("request failed: {}", self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub current: Option<RevisionId>,
    pub head: Option<RevisionId>,
    pub pending: Vec<RevisionId>,
    pub up_to_date: bool,
}

#[derive(Debug, Serialize)]
pub struct ChainEntry {
    pub id: RevisionId,
    pub parent_id: Option<RevisionId>,
    pub message: Option<String>,
    pub upgrade_ops: usize,
    pub downgrade_ops: usize,
    pub applied: bool,
    pub current: bool,
}

pub fn create_router(store: SqliteStore, chain: Chain) -> Router {
    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        chain: Arc::new(chain),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/chain", get(chain))
        .route("/history", get(history))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "revchain",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let current = state.store()?.marker()?;
    let pending = state
        .chain
        .pending(current.as_ref())?
        .iter()
        .map(|r| r.id.clone())
        .collect::<Vec<_>>();

    Ok(Json(StatusResponse {
        head: state.chain.head().map(|r| r.id.clone()),
        up_to_date: pending.is_empty(),
        current,
        pending,
    }))
}

async fn chain(State(state): State<AppState>) -> Result<Json<Vec<ChainEntry>>, ApiError> {
    let current = state.store()?.marker()?;
    let applied_through = state.chain.position(current.as_ref())?;

    let entries = state
        .chain
        .revisions()
        .iter()
        .enumerate()
        .map(|(i, r)| ChainEntry {
            id: r.id.clone(),
            parent_id: r.parent_id.clone(),
            message: r.message.clone(),
            upgrade_ops: r.upgrade_ops.len(),
            downgrade_ops: r.downgrade_ops.len(),
            applied: i < applied_through,
            current: current.as_ref() == Some(&r.id),
        })
        .collect();

    Ok(Json(entries))
}

async fn history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let history = state.store()?.history()?;
    Ok(Json(history))
}
