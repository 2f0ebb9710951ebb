//! REST surface for the dashboard.

pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::Pool;
use crate::shopee::ShopeeApi;
use crate::sync::SyncEngine;
use crate::tokens::TokenManager;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub api: Arc<dyn ShopeeApi>,
    pub tokens: Arc<TokenManager>,
    pub sync: Arc<SyncEngine>,
}

pub const ROUTES: &[&str] = &[
    "GET  /connect",
    "GET  /oauth/callback",
    "GET  /status",
    "GET  /products",
    "GET  /products/{item_id}",
    "POST /products/sync",
    "GET  /orders",
    "POST /orders/sync",
    "GET  /stats",
    "GET  /sync-runs",
    "GET  /health",
];

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/connect", get(handlers::connect))
        .route("/oauth/callback", get(handlers::oauth_callback))
        .route("/status", get(handlers::status))
        .route("/products", get(handlers::list_products))
        .route("/products/{item_id}", get(handlers::get_product))
        .route("/products/sync", post(handlers::sync_products))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/sync", post(handlers::sync_orders))
        .route("/stats", get(handlers::stats))
        .route("/sync-runs", get(handlers::sync_runs))
        .route("/health", get(handlers::health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "route not found",
            "available_routes": ROUTES,
        })),
    )
}
