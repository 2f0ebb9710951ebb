//! Cache entities and the write-side views built from remote payloads.
//!
//! Keep these structs focused on the data stored and returned by the
//! repositories. Business logic lives in higher layers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::model::{ItemStatus, OrderStatus, SyncStatus, SyncType};
use crate::shopee::{ItemDetail, OrderDetail};

/// Seconds before nominal expiry at which a token is already treated as
/// expired, so a request is never signed with a token that dies mid-flight.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 300;

/// The single active credential for a connected shop.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub shop_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub shop_name: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl Credential {
    /// True when `now` has entered the safety margin; inclusive at the
    /// boundary `expires_at - margin`.
    pub fn is_expired(expires_at: i64, now: i64) -> bool {
        now >= expires_at - TOKEN_SAFETY_MARGIN_SECS
    }
}

/// Cached mirror of a remote item.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub item_id: i64,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub status: ItemStatus,
    pub current_price: f64,
    pub original_price: f64,
    pub stock_available: i64,
    pub stock_reserved: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub rating_star: f64,
    pub rating_count: i64,
    pub image_urls: Vec<String>,
    pub create_time: i64,
    pub update_time: i64,
    pub last_synced: DateTime<Utc>,
}

/// Write-side product view, assembled from one remote detail record.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub item_id: i64,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub status: ItemStatus,
    pub current_price: f64,
    pub original_price: f64,
    pub stock_available: i64,
    pub stock_reserved: i64,
    pub sales_count: i64,
    pub view_count: i64,
    pub rating_star: f64,
    pub rating_count: i64,
    pub image_urls: Vec<String>,
    pub create_time: i64,
    pub update_time: i64,
    pub raw_payload: Value,
}

impl NewProduct {
    pub fn from_detail(detail: &ItemDetail) -> Self {
        let price = detail.price_info.first().cloned().unwrap_or_default();
        let stock = detail
            .stock_info_v2
            .as_ref()
            .map(|s| s.summary_info.clone())
            .unwrap_or_default();
        let rating = detail.item_rating.clone().unwrap_or_default();
        NewProduct {
            item_id: detail.item_id,
            name: detail.item_name.clone(),
            sku: detail.item_sku.clone(),
            status: detail
                .item_status
                .as_deref()
                .map(ItemStatus::parse)
                .unwrap_or(ItemStatus::Unknown),
            current_price: price.current_price,
            original_price: price.original_price,
            stock_available: stock.total_available_stock,
            stock_reserved: stock.total_reserved_stock,
            sales_count: detail.sales,
            view_count: detail.view_count,
            rating_star: rating.rating_star,
            rating_count: rating.rating_count.first().copied().unwrap_or(0),
            image_urls: detail.image_urls(),
            create_time: detail.create_time,
            update_time: detail.update_time,
            raw_payload: detail.raw.clone(),
        }
    }
}

/// One line of an order, as served to the dashboard.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: i64,
}

/// Cached mirror of a remote order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub order_sn: String,
    pub status: OrderStatus,
    pub buyer_username: Option<String>,
    pub total_amount: f64,
    pub shipping_fee: f64,
    pub item_count: i64,
    pub payment_method: Option<String>,
    pub recipient_address: Value,
    pub line_items: Vec<LineItem>,
    pub create_time: i64,
    pub update_time: i64,
    pub last_synced: DateTime<Utc>,
}

/// Write-side order view, assembled from one remote detail record.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_sn: String,
    pub status: OrderStatus,
    pub buyer_username: Option<String>,
    pub total_amount: f64,
    pub shipping_fee: f64,
    pub item_count: i64,
    pub payment_method: Option<String>,
    pub recipient_address: Value,
    pub line_items: Vec<LineItem>,
    pub create_time: i64,
    pub update_time: i64,
    pub raw_payload: Value,
}

impl NewOrder {
    pub fn from_detail(detail: &OrderDetail) -> Self {
        NewOrder {
            order_sn: detail.order_sn.clone(),
            status: detail
                .order_status
                .as_deref()
                .map(OrderStatus::parse)
                .unwrap_or(OrderStatus::Unknown),
            buyer_username: detail.buyer_username.clone(),
            total_amount: detail.total_amount,
            shipping_fee: detail.shipping_fee(),
            item_count: detail.item_list.len() as i64,
            payment_method: detail.payment_method.clone(),
            recipient_address: detail
                .recipient_address
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            line_items: detail
                .item_list
                .iter()
                .map(|li| LineItem {
                    name: li.item_name.clone(),
                    quantity: li.model_quantity_purchased,
                })
                .collect(),
            create_time: detail.create_time,
            update_time: detail.update_time,
            raw_payload: detail.raw.clone(),
        }
    }
}

/// Filter for paged product reads.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub status: Option<ItemStatus>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Filter for paged order reads.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub days: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// Append-only audit record of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub sync_type: SyncType,
    pub items_count: i64,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Cache aggregates served by `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub product_count: i64,
    pub products_by_status: Vec<(String, i64)>,
    pub order_count: i64,
    pub orders_by_status: Vec<(String, i64)>,
    pub total_revenue: f64,
}
