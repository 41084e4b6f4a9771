// src/admin/mod.rs
//! Admin HTTP surface over the cache-management operations.
//!
//! Every route except `/health` requires the configured admin token, sent as
//! `Authorization: Bearer <token>` or in an `admin_token` cookie.

use crate::fetchers::DashboardData;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ADMIN_COOKIE: &str = "admin_token";

#[derive(Clone)]
pub struct AdminState {
    pub data: Arc<DashboardData>,
    pub admin_token: Option<Arc<str>>,
}

pub struct AdminServer {
    bind_addr: String,
    state: AdminState,
}

impl AdminServer {
    pub fn new(bind_addr: impl Into<String>, data: Arc<DashboardData>, admin_token: Option<String>) -> Self {
        if admin_token.is_none() {
            warn!("ADMIN_TOKEN is not set; admin routes will reject every request");
        }
        Self {
            bind_addr: bind_addr.into(),
            state: AdminState {
                data,
                admin_token: admin_token.map(Arc::from),
            },
        }
    }

    pub async fn start(self) -> std::io::Result<()> {
        let app = self.create_router();
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        info!("🚀 Admin server listening on {}", self.bind_addr);
        axum::serve(listener, app).await
    }

    pub fn create_router(&self) -> Router {
        router(self.state.clone())
    }
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/admin/check", get(check_token))
        .route("/clear-cache", get(clear_cache))
        .route("/refresh-data", get(refresh_data))
        .route("/cache-status", get(cache_status))
        .route("/cache-keys", get(cache_keys))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ADMIN_COOKIE)
        .map(|(_, value)| value.trim())
}

/// Checks the request's token against the configured secret.
pub fn authorize(state: &AdminState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let presented = bearer_token(headers).or_else(|| cookie_token(headers));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => {
            warn!("Rejected admin request with missing or invalid token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "token-dashboard",
        "timestamp": chrono::Utc::now().timestamp()
    }))
}

async fn check_token(State(state): State<AdminState>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(json!({ "authenticated": true })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheParams {
    /// Comma-separated cache keys; absent clears everything.
    pub key: Option<String>,
}

async fn clear_cache(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(params): Query<ClearCacheParams>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    let keys: Option<Vec<String>> = params.key.map(|k| {
        k.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    });
    let result = state.data.clear_cache(keys.as_deref()).await;
    info!("🧹 Admin cache clear: {}", result.message);
    Ok(Json(json!(result)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(rename = "clearCache", default)]
    pub clear_cache: bool,
}

async fn refresh_data(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(params): Query<RefreshParams>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    info!("🔄 Admin refresh requested (clear cache: {})", params.clear_cache);
    let result = state.data.refresh_all(params.clear_cache).await;
    Ok(Json(json!(result)))
}

async fn cache_status(State(state): State<AdminState>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(json!(state.data.get_cache_status().await)))
}

async fn cache_keys(State(state): State<AdminState>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorize(&state, &headers)?;
    let keys = state.data.list_cache_keys().await;
    Ok(Json(json!({ "count": keys.len(), "keys": keys })))
}
