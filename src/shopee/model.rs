//! Wire types for the partner API.
//!
//! Every v2 endpoint wraps its payload in a common envelope carrying
//! `error`/`message` strings; a non-empty `error` means failure even on
//! HTTP 200. Token endpoints return their fields at the top level of the
//! envelope instead of under `response`.

use serde::Deserialize;
use serde_json::Value;

const IMAGE_CDN_BASE: &str = "https://cf.shopee.com.br/file/";

/// Common response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: String,
    pub response: Option<T>,
}

/// Token issuance / refresh payload (top-level, no `response` nesting).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expire_in: i64,
}

/// Shop metadata. Cosmetic; callers degrade to a placeholder on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ShopInfo {
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ShopInfo {
    /// Display object used when the metadata fetch fails; shop info must
    /// never block the connection flow.
    pub fn placeholder(shop_id: &str) -> Self {
        ShopInfo {
            shop_name: Some(format!("Shop {shop_id}")),
            region: None,
            status: Some("connected".into()),
        }
    }
}

/// One entry of the item list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRef {
    pub item_id: i64,
    #[serde(default)]
    pub item_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemListResponse {
    #[serde(default)]
    pub item: Vec<ItemRef>,
    #[serde(default)]
    pub total_count: i64,
    #[serde(default)]
    pub has_next_page: bool,
}

/// One page of the item list, normalized for the orchestrator.
#[derive(Debug, Clone)]
pub struct ItemPage {
    pub items: Vec<ItemRef>,
    pub total_count: i64,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceInfo {
    #[serde(default)]
    pub current_price: f64,
    #[serde(default)]
    pub original_price: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockSummary {
    #[serde(default)]
    pub total_available_stock: i64,
    #[serde(default)]
    pub total_reserved_stock: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockInfo {
    #[serde(default)]
    pub summary_info: StockSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemImage {
    #[serde(default)]
    pub image_url_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemRating {
    #[serde(default)]
    pub rating_star: f64,
    #[serde(default)]
    pub rating_count: Vec<i64>,
}

/// Full item record from the base-info endpoint. `raw` keeps the remote
/// JSON verbatim for the cache's opaque payload column.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    pub item_id: i64,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub item_sku: Option<String>,
    #[serde(default)]
    pub item_status: Option<String>,
    #[serde(default)]
    pub price_info: Vec<PriceInfo>,
    #[serde(default)]
    pub stock_info_v2: Option<StockInfo>,
    #[serde(default)]
    pub image: Option<ItemImage>,
    #[serde(default)]
    pub sales: i64,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub item_rating: Option<ItemRating>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(skip)]
    pub raw: Value,
}

impl ItemDetail {
    /// Absolute image URLs; bare Shopee file ids are expanded to the CDN.
    pub fn image_urls(&self) -> Vec<String> {
        self.image
            .as_ref()
            .map(|img| {
                img.image_url_list
                    .iter()
                    .map(|u| {
                        if u.starts_with("http") {
                            u.clone()
                        } else {
                            format!("{IMAGE_CDN_BASE}{u}")
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetailResponse {
    #[serde(default)]
    pub item_list: Vec<Value>,
}

/// One entry of the order list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRef {
    pub order_sn: String,
    #[serde(default)]
    pub order_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderListResponse {
    #[serde(default)]
    pub order_list: Vec<OrderRef>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub next_cursor: String,
}

/// One page of the order list, normalized for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<OrderRef>,
    pub has_next_page: bool,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderLineItem {
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub model_quantity_purchased: i64,
}

/// Full order record from the detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetail {
    pub order_sn: String,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub buyer_username: Option<String>,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub actual_shipping_fee: Option<f64>,
    #[serde(default)]
    pub estimated_shipping_fee: Option<f64>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub recipient_address: Option<Value>,
    #[serde(default)]
    pub item_list: Vec<OrderLineItem>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    #[serde(skip)]
    pub raw: Value,
}

impl OrderDetail {
    pub fn shipping_fee(&self) -> f64 {
        self.actual_shipping_fee
            .or(self.estimated_shipping_fee)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetailResponse {
    #[serde(default)]
    pub order_list: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_error_field_defaults_empty() {
        let env: Envelope<ItemListResponse> = serde_json::from_str(
            r#"{"request_id":"abc","response":{"item":[{"item_id":1}],"total_count":1,"has_next_page":false}}"#,
        )
        .unwrap();
        assert!(env.error.is_empty());
        assert_eq!(env.response.unwrap().item[0].item_id, 1);
    }

    #[test]
    fn item_detail_expands_relative_image_urls() {
        let detail: ItemDetail = serde_json::from_str(
            r#"{"item_id":7,"image":{"image_url_list":["abc123","https://cdn/x.jpg"]}}"#,
        )
        .unwrap();
        let urls = detail.image_urls();
        assert_eq!(urls[0], "https://cf.shopee.com.br/file/abc123");
        assert_eq!(urls[1], "https://cdn/x.jpg");
    }

    #[test]
    fn order_detail_prefers_actual_shipping_fee() {
        let mut detail: OrderDetail = serde_json::from_str(
            r#"{"order_sn":"X1","estimated_shipping_fee":5.5}"#,
        )
        .unwrap();
        assert_eq!(detail.shipping_fee(), 5.5);
        detail.actual_shipping_fee = Some(4.0);
        assert_eq!(detail.shipping_fee(), 4.0);
    }

    #[test]
    fn token_response_parses_top_level_fields() {
        let tok: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expire_in":14400,"request_id":"q"}"#,
        )
        .unwrap();
        assert_eq!(tok.access_token, "a");
        assert_eq!(tok.expire_in, 14400);
        assert!(tok.error.is_empty());
    }
}
