/// Server hand-off
///
/// `serve` gives the already-open store to a small Axum application. Only a
/// health check and read-only listings are exposed here; the full application
/// API lives in the main backend.

use crate::{
    config::ServerConfig,
    store::{AdminStore, ProjectSummary, Store},
};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Optional filter for `/api/projects`
#[derive(Debug, Deserialize)]
pub struct ProjectFilter {
    pub owner: Option<String>,
}

/// Create the Axum application around an open store
pub fn create_app(store: Arc<Store>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/users", get(list_users))
        .route("/api/projects", get(list_projects))
        .with_state(AppState { store })
}

/// Serve on `host:port` until the process is stopped
///
/// The store is closed once the server returns, or straight away if the
/// address cannot be bound.
pub async fn start_server(config: &ServerConfig, port: u16, store: Store) -> Result<()> {
    let bind_addr = format!("{}:{}", config.host, port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            store.close().await;
            return Err(anyhow::anyhow!("Failed to bind {}: {}", bind_addr, e));
        }
    };

    let store = Arc::new(store);
    let app = create_app(Arc::clone(&store));

    tracing::info!("Server listening on http://{}", bind_addr);
    let served = axum::serve(listener, app.into_make_service()).await;

    if let Ok(store) = Arc::try_unwrap(store) {
        store.close().await;
    }
    served?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/users
/// Returns: { "users": ["alice", ...] }
async fn list_users(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    match state.store.user_names().try_collect::<Vec<String>>().await {
        Ok(users) => Ok(Json(json!({ "users": users }))),
        Err(e) => {
            tracing::error!("Failed to list users: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/projects[?owner=<user>]
/// Returns: { "projects": [{ "id": 1, "name": "..." }, ...] }
async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Value>, StatusCode> {
    let projects = match filter.owner.as_deref() {
        Some(owner) => {
            state
                .store
                .owned_projects(owner)
                .try_collect::<Vec<ProjectSummary>>()
                .await
        }
        None => state.store.projects().try_collect::<Vec<ProjectSummary>>().await,
    };
    match projects {
        Ok(projects) => Ok(Json(json!({ "projects": projects }))),
        Err(e) => {
            tracing::error!("Failed to list projects: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
