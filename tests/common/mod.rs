//! Shared fixtures: an in-memory database and a scripted partner API
//! that records every call it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;

use shopsync::config;
use shopsync::db::Pool;
use shopsync::error::AppError;
use shopsync::model::{ItemStatus, OrderStatus};
use shopsync::shopee::{
    ItemDetail, ItemPage, ItemRef, OrderDetail, OrderPage, OrderRef, ShopInfo, ShopeeApi,
    TokenPair,
};
use shopsync::sync::SyncEngine;
use shopsync::tokens::TokenManager;

pub async fn setup_pool() -> Pool {
    // One connection so every query sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Fast sync settings for tests: no throttle delays.
pub fn test_settings() -> config::Sync {
    config::Sync {
        product_page_size: 50,
        order_page_size: 100,
        page_delay_ms: 0,
        status_scan_delay_ms: 0,
        order_window_days: 15,
        default_order_days: 90,
        token_refresh_interval_secs: 10800,
    }
}

pub fn engine(pool: &Pool, api: Arc<ScriptedApi>, settings: config::Sync) -> SyncEngine {
    let tokens = Arc::new(TokenManager::new(pool.clone(), api.clone()));
    SyncEngine::new(pool.clone(), api, tokens, settings)
}

#[derive(Default)]
pub struct ScriptedApi {
    /// Total NORMAL items the fake shop holds.
    pub items_total: i64,
    /// Remote failure injected when the item list is asked for this offset.
    pub fail_on_item_offset: Option<i64>,
    /// Reject the token on the first item-list call only.
    pub reject_token_once: AtomicBool,
    /// Orders the fake returns per status filter.
    pub orders_by_status: HashMap<OrderStatus, Vec<String>>,

    pub item_list_offsets: Mutex<Vec<i64>>,
    pub order_list_calls: Mutex<Vec<(i64, i64, Option<OrderStatus>)>>,
    pub order_detail_calls: Mutex<Vec<Vec<String>>>,
    pub refresh_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn with_items(items_total: i64) -> Self {
        Self {
            items_total,
            ..Self::default()
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShopeeApi for ScriptedApi {
    fn auth_url(&self) -> String {
        "https://partner.test/api/v2/shop/auth_partner?sign=scripted".into()
    }

    async fn exchange_code_for_token(
        &self,
        _code: &str,
        _shop_id: &str,
    ) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: "scripted-access".into(),
            refresh_token: "scripted-refresh".into(),
            expires_in: 14400,
        })
    }

    async fn refresh_token(
        &self,
        _shop_id: &str,
        _refresh_token: &str,
    ) -> Result<TokenPair, AppError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenPair {
            access_token: format!("refreshed-{n}"),
            refresh_token: format!("refresh-{}", n + 1),
            expires_in: 14400,
        })
    }

    async fn get_shop_info(
        &self,
        _access_token: &str,
        _shop_id: &str,
    ) -> Result<ShopInfo, AppError> {
        Ok(ShopInfo {
            shop_name: Some("Scripted Shop".into()),
            region: Some("BR".into()),
            status: Some("NORMAL".into()),
        })
    }

    async fn list_items(
        &self,
        _access_token: &str,
        _shop_id: &str,
        page_size: i64,
        offset: i64,
        _status: ItemStatus,
    ) -> Result<ItemPage, AppError> {
        self.item_list_offsets.lock().unwrap().push(offset);
        if self.reject_token_once.swap(false, Ordering::SeqCst) {
            return Err(AppError::TokenExpired);
        }
        if self.fail_on_item_offset == Some(offset) {
            return Err(AppError::remote(500, "error_server", "injected failure"));
        }
        let end = (offset + page_size).min(self.items_total);
        let items = (offset..end)
            .map(|id| ItemRef {
                item_id: id + 1,
                item_status: Some("NORMAL".into()),
            })
            .collect();
        Ok(ItemPage {
            items,
            total_count: self.items_total,
            has_next_page: end < self.items_total,
        })
    }

    async fn get_item_details(
        &self,
        _access_token: &str,
        _shop_id: &str,
        item_ids: &[i64],
    ) -> Result<Vec<ItemDetail>, AppError> {
        Ok(item_ids
            .iter()
            .map(|id| {
                let raw = json!({
                    "item_id": id,
                    "item_name": format!("Item {id}"),
                    "item_status": "NORMAL",
                    "price_info": [{"current_price": 10.0, "original_price": 12.0}],
                    "update_time": 1_700_000_000 + id,
                });
                let mut detail: ItemDetail = serde_json::from_value(raw.clone()).unwrap();
                detail.raw = raw;
                detail
            })
            .collect())
    }

    async fn list_orders(
        &self,
        _access_token: &str,
        _shop_id: &str,
        time_from: i64,
        time_to: i64,
        _page_size: i64,
        _cursor: &str,
        status: Option<OrderStatus>,
    ) -> Result<OrderPage, AppError> {
        self.order_list_calls
            .lock()
            .unwrap()
            .push((time_from, time_to, status));
        let orders = status
            .and_then(|st| self.orders_by_status.get(&st))
            .map(|sns| {
                sns.iter()
                    .map(|sn| OrderRef {
                        order_sn: sn.clone(),
                        order_status: status.map(|s| s.as_str().to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(OrderPage {
            orders,
            has_next_page: false,
            next_cursor: String::new(),
        })
    }

    async fn get_order_details(
        &self,
        _access_token: &str,
        _shop_id: &str,
        order_sns: &[String],
    ) -> Result<Vec<OrderDetail>, AppError> {
        self.order_detail_calls
            .lock()
            .unwrap()
            .push(order_sns.to_vec());
        Ok(order_sns
            .iter()
            .map(|sn| {
                let raw = json!({
                    "order_sn": sn,
                    "order_status": "COMPLETED",
                    "total_amount": 42.0,
                    "create_time": chrono::Utc::now().timestamp() - 3600,
                    "item_list": [{"item_name": "thing", "model_quantity_purchased": 1}],
                });
                let mut detail: OrderDetail = serde_json::from_value(raw.clone()).unwrap();
                detail.raw = raw;
                detail
            })
            .collect())
    }
}
