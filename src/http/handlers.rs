//! Request handlers. Thin: validate input, call the owning component,
//! shape the JSON body. No business logic lives here.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::db::{self, OrderFilter, ProductFilter};
use crate::error::AppError;
use crate::model::{ItemStatus, OrderStatus};
use crate::sync::OrderSyncRequest;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub async fn connect(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "auth_url": state.api.auth_url() }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub shop_id: Option<String>,
}

/// OAuth landing. The platform probes the redirect URL without
/// parameters when the partner configures it; that probe gets a JSON
/// readiness answer instead of an error page.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(q): Query<CallbackQuery>,
) -> Response {
    let (code, shop_id) = match (q.code, q.shop_id) {
        (Some(code), Some(shop_id)) => (code, shop_id),
        (None, None) => {
            return Json(json!({
                "success": true,
                "message": "callback endpoint ready",
            }))
            .into_response();
        }
        _ => {
            return failure_page("The authorization redirect is missing `code` or `shop_id`.")
                .into_response();
        }
    };

    match state.tokens.connect(&code, &shop_id).await {
        Ok(info) => {
            let name = info.shop_name.unwrap_or_else(|| format!("Shop {shop_id}"));
            Html(format!(
                "<!DOCTYPE html><html><head><title>Shop connected</title></head>\
                 <body style=\"font-family:sans-serif;text-align:center;padding:4em\">\
                 <h1>&#10004; {name} connected</h1>\
                 <p>Shop ID {shop_id} is now linked. You can close this tab and\
                 trigger a sync from the dashboard.</p>\
                 </body></html>"
            ))
            .into_response()
        }
        Err(err) => {
            warn!(%err, shop_id, "token exchange failed");
            failure_page(&err.to_string()).into_response()
        }
    }
}

fn failure_page(reason: &str) -> (StatusCode, Html<String>) {
    (
        StatusCode::BAD_REQUEST,
        Html(format!(
            "<!DOCTYPE html><html><head><title>Connection failed</title></head>\
             <body style=\"font-family:sans-serif;text-align:center;padding:4em\">\
             <h1>&#10008; Connection failed</h1><p>{reason}</p>\
             <p>Start again from <code>/connect</code>.</p>\
             </body></html>"
        )),
    )
}

pub async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let cred = db::repo::current_credential(&state.pool).await?;
    let body = match cred {
        Some(c) => json!({
            "success": true,
            "connected": true,
            "shop": {
                "shop_id": c.shop_id,
                "shop_name": c.shop_name,
                "connected_at": c.connected_at,
                "token_expires_at": c.expires_at,
            },
        }),
        None => json!({ "success": true, "connected": false }),
    };
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub search: Option<String>,
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<ProductsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (limit, offset, page) = paging(q.page, q.limit);
    let status = q.status.as_deref().map(parse_item_status).transpose()?;
    let filter = ProductFilter {
        status,
        search: q.search,
        limit,
        offset,
    };

    let products = db::repo::get_products(&state.pool, &filter).await?;
    let total = db::repo::count_products(&state.pool, &filter).await?;
    Ok(Json(json!({
        "success": true,
        "data": products,
        "pagination": pagination(page, limit, total),
    })))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Response, AppError> {
    match db::repo::get_product(&state.pool, item_id).await? {
        Some(product) => Ok(Json(json!({ "success": true, "data": product })).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("product {item_id} not cached") })),
        )
            .into_response()),
    }
}

pub async fn sync_products(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let outcome = state.sync.sync_products().await?;
    Ok(Json(json!({
        "success": true,
        "total_synced": outcome.total_synced,
        "status": outcome.status.as_str(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub days: Option<i64>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(q): Query<OrdersQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (limit, offset, page) = paging(q.page, q.limit);
    let status = q.status.as_deref().map(parse_order_status).transpose()?;
    if q.days.is_some_and(|d| d <= 0) {
        return Err(AppError::validation("days must be a positive integer"));
    }
    let filter = OrderFilter {
        status,
        days: q.days,
        limit,
        offset,
    };

    let orders = db::repo::get_orders(&state.pool, &filter).await?;
    let total = db::repo::count_orders(&state.pool, &filter).await?;
    Ok(Json(json!({
        "success": true,
        "data": orders,
        "pagination": pagination(page, limit, total),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderSyncBody {
    pub days: Option<i64>,
    pub status: Option<String>,
}

pub async fn sync_orders(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    // The body is optional; an empty POST syncs the default range.
    let body: OrderSyncBody = if body.is_empty() {
        OrderSyncBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("invalid sync request body: {e}")))?
    };
    if body.days.is_some_and(|d| d <= 0) {
        return Err(AppError::validation("days must be a positive integer"));
    }
    let status = body.status.as_deref().map(parse_order_status).transpose()?;

    let outcome = state
        .sync
        .sync_orders(OrderSyncRequest {
            days: body.days,
            status,
        })
        .await?;
    Ok(Json(json!({
        "success": true,
        "total_synced": outcome.total_synced,
        "status": outcome.status.as_str(),
    })))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = db::repo::cache_stats(&state.pool).await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

pub async fn sync_runs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let runs = db::repo::list_sync_runs(&state.pool, 20).await?;
    Ok(Json(json!({ "success": true, "data": runs })))
}

pub async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let connected = db::repo::current_credential(&state.pool).await?.is_some();
    Ok(Json(json!({
        "success": true,
        "status": "ok",
        "connected": connected,
    })))
}

fn paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (limit, (page - 1) * limit, page)
}

fn pagination(page: i64, limit: i64, total: i64) -> serde_json::Value {
    json!({
        "page": page,
        "per_page": limit,
        "total_items": total,
        "total_pages": (total + limit - 1) / limit.max(1),
    })
}

fn parse_item_status(s: &str) -> Result<ItemStatus, AppError> {
    match ItemStatus::parse(s) {
        ItemStatus::Unknown if s != "UNKNOWN" => Err(AppError::validation(format!(
            "unknown product status {s:?}"
        ))),
        status => Ok(status),
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus, AppError> {
    match OrderStatus::parse(s) {
        OrderStatus::Unknown if s != "UNKNOWN" => Err(AppError::validation(format!(
            "unknown order status {s:?}"
        ))),
        status => Ok(status),
    }
}
