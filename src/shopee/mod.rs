//! Signed HTTP client for the Shopee Open Platform partner API.
//!
//! Every operation follows the same shape: take `timestamp = now`, sign
//! the canonical string, attach `partner_id`/`timestamp`/`sign` (plus
//! `access_token`/`shop_id` for shop-scoped calls) as query parameters,
//! send with a bounded timeout, and map the response envelope into typed
//! payloads or an `AppError::Remote`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::config::Shopee as ShopeeConfig;
use crate::error::AppError;
use crate::model::{ItemStatus, OrderStatus};

pub mod model;
pub mod sign;

pub use model::{ItemDetail, ItemPage, ItemRef, OrderDetail, OrderPage, OrderRef, ShopInfo};

const PATH_AUTH_PARTNER: &str = "/api/v2/shop/auth_partner";
const PATH_TOKEN_GET: &str = "/api/v2/auth/token/get";
const PATH_TOKEN_REFRESH: &str = "/api/v2/auth/access_token/get";
const PATH_SHOP_INFO: &str = "/api/v2/shop/get_shop_info";
const PATH_ITEM_LIST: &str = "/api/v2/product/get_item_list";
const PATH_ITEM_BASE_INFO: &str = "/api/v2/product/get_item_base_info";
const PATH_ORDER_LIST: &str = "/api/v2/order/get_order_list";
const PATH_ORDER_DETAIL: &str = "/api/v2/order/get_order_detail";

/// Per-call deadlines: light metadata calls, list pages, detail batches.
const TIMEOUT_LIGHT: Duration = Duration::from_secs(10);
const TIMEOUT_LIST: Duration = Duration::from_secs(30);
const TIMEOUT_DETAIL: Duration = Duration::from_secs(45);

/// Hard cap on a single order-list window. The remote API rejects wider
/// ranges; callers cover longer spans with multiple windowed calls.
pub const MAX_ORDER_WINDOW_SECS: i64 = 15 * 24 * 60 * 60;

/// Optional detail fields requested on every order-detail call.
const ORDER_DETAIL_OPTIONAL_FIELDS: &str = "buyer_user_id,buyer_username,estimated_shipping_fee,\
recipient_address,actual_shipping_fee,goods_to_declare,note,note_update_time,item_list,pay_time,\
buyer_cancel_reason,cancel_by,cancel_reason,actual_shipping_fee_confirmed,fulfillment_flag,\
pickup_done_time,package_list,shipping_carrier,payment_method,total_amount,invoice_data,\
checkout_shipping_carrier,reverse_shipping_fee";

/// New access/refresh pair issued by the token endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Remote operations the rest of the app depends on. Tests substitute
/// recording fakes for this trait.
#[async_trait]
pub trait ShopeeApi: Send + Sync {
    /// Signed shop-authorization URL the owner is redirected to.
    fn auth_url(&self) -> String;

    async fn exchange_code_for_token(
        &self,
        code: &str,
        shop_id: &str,
    ) -> Result<TokenPair, AppError>;

    async fn refresh_token(
        &self,
        shop_id: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AppError>;

    async fn get_shop_info(
        &self,
        access_token: &str,
        shop_id: &str,
    ) -> Result<ShopInfo, AppError>;

    async fn list_items(
        &self,
        access_token: &str,
        shop_id: &str,
        page_size: i64,
        offset: i64,
        status: ItemStatus,
    ) -> Result<ItemPage, AppError>;

    async fn get_item_details(
        &self,
        access_token: &str,
        shop_id: &str,
        item_ids: &[i64],
    ) -> Result<Vec<ItemDetail>, AppError>;

    #[allow(clippy::too_many_arguments)]
    async fn list_orders(
        &self,
        access_token: &str,
        shop_id: &str,
        time_from: i64,
        time_to: i64,
        page_size: i64,
        cursor: &str,
        status: Option<OrderStatus>,
    ) -> Result<OrderPage, AppError>;

    async fn get_order_details(
        &self,
        access_token: &str,
        shop_id: &str,
        order_sns: &[String],
    ) -> Result<Vec<OrderDetail>, AppError>;
}

#[derive(Clone)]
pub struct ShopeeClient {
    http: Client,
    base_url: Url,
    partner_id: String,
    partner_key: String,
    redirect_url: String,
}

impl fmt::Debug for ShopeeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopeeClient")
            .field("base_url", &self.base_url)
            .field("partner_id", &self.partner_id)
            .finish_non_exhaustive()
    }
}

impl ShopeeClient {
    pub fn from_config(cfg: &ShopeeConfig) -> Result<Self, AppError> {
        let base_url = Url::parse(&cfg.api_base)
            .map_err(|e| AppError::validation(format!("invalid shopee.api_base: {e}")))?;
        Ok(Self::new(
            base_url,
            cfg.partner_id.clone(),
            cfg.partner_key.clone(),
            cfg.redirect_url.clone(),
        ))
    }

    pub fn new(base_url: Url, partner_id: String, partner_key: String, redirect_url: String) -> Self {
        let http = Client::builder()
            .user_agent("shopsync/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            partner_id,
            partner_key,
            redirect_url,
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    fn sign(&self, path: &str, ts: i64, token: Option<&str>, shop_id: Option<&str>) -> String {
        sign::sign(&self.partner_id, &self.partner_key, path, ts, token, shop_id)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AppError::validation(format!("invalid API path {path}: {e}")))
    }

    /// Signed query parameters common to every call.
    fn base_params(
        &self,
        path: &str,
        token: Option<&str>,
        shop_id: Option<&str>,
    ) -> Vec<(String, String)> {
        let ts = Self::now();
        let signature = self.sign(path, ts, token, shop_id);
        let mut params = vec![
            ("partner_id".to_string(), self.partner_id.clone()),
            ("timestamp".to_string(), ts.to_string()),
            ("sign".to_string(), signature),
        ];
        if let Some(t) = token {
            params.push(("access_token".to_string(), t.to_string()));
        }
        if let Some(s) = shop_id {
            params.push(("shop_id".to_string(), s.to_string()));
        }
        params
    }

    /// Rejections flavored like auth failures trigger refresh-and-retry.
    fn classify(http_status: StatusCode, code: &str, message: &str) -> AppError {
        if code.contains("auth") || code.contains("token") {
            AppError::TokenExpired
        } else {
            AppError::remote(http_status.as_u16(), code, message)
        }
    }

    async fn get_envelope<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        shop_id: Option<&str>,
        extra: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, AppError> {
        let mut params = self.base_params(path, token, shop_id);
        for (k, v) in extra {
            params.push((k.to_string(), v.clone()));
        }
        let res = self
            .http
            .get(self.endpoint(path)?)
            .query(&params)
            .timeout(timeout)
            .send()
            .await?;

        let http_status = res.status();
        let env: model::Envelope<T> = res.json().await?;
        if !env.error.is_empty() {
            warn!(path, code = %env.error, message = %env.message, "partner API error");
            return Err(Self::classify(http_status, &env.error, &env.message));
        }
        if !http_status.is_success() {
            return Err(AppError::remote(http_status.as_u16(), "http", env.message));
        }
        env.response
            .ok_or_else(|| AppError::remote(http_status.as_u16(), "empty", "missing response body"))
    }

    async fn post_token_endpoint(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<TokenPair, AppError> {
        let params = self.base_params(path, None, None);
        let res = self
            .http
            .post(self.endpoint(path)?)
            .query(&params)
            .json(&body)
            .timeout(TIMEOUT_LIGHT)
            .send()
            .await?;

        let http_status = res.status();
        let tok: model::TokenResponse = res.json().await?;
        if !tok.error.is_empty() {
            warn!(path, code = %tok.error, message = %tok.message, "token endpoint error");
            return Err(AppError::remote(http_status.as_u16(), tok.error, tok.message));
        }
        if !http_status.is_success() || tok.access_token.is_empty() {
            return Err(AppError::remote(
                http_status.as_u16(),
                "token",
                "token endpoint returned no access token",
            ));
        }
        Ok(TokenPair {
            access_token: tok.access_token,
            refresh_token: tok.refresh_token,
            expires_in: tok.expire_in,
        })
    }

    fn parse_shop_id(shop_id: &str) -> Result<i64, AppError> {
        shop_id
            .parse::<i64>()
            .map_err(|_| AppError::validation(format!("shop_id must be numeric, got {shop_id:?}")))
    }
}

#[async_trait]
impl ShopeeApi for ShopeeClient {
    fn auth_url(&self) -> String {
        let ts = Self::now();
        let signature = self.sign(PATH_AUTH_PARTNER, ts, None, None);
        format!(
            "{}{}?partner_id={}&timestamp={}&sign={}&redirect={}",
            self.base_url.as_str().trim_end_matches('/'),
            PATH_AUTH_PARTNER,
            self.partner_id,
            ts,
            signature,
            urlencoding::encode(&self.redirect_url),
        )
    }

    async fn exchange_code_for_token(
        &self,
        code: &str,
        shop_id: &str,
    ) -> Result<TokenPair, AppError> {
        let body = json!({
            "code": code,
            "shop_id": Self::parse_shop_id(shop_id)?,
            "partner_id": self.partner_id.parse::<i64>().unwrap_or_default(),
        });
        self.post_token_endpoint(PATH_TOKEN_GET, body).await
    }

    async fn refresh_token(
        &self,
        shop_id: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, AppError> {
        let body = json!({
            "refresh_token": refresh_token,
            "shop_id": Self::parse_shop_id(shop_id)?,
            "partner_id": self.partner_id.parse::<i64>().unwrap_or_default(),
        });
        self.post_token_endpoint(PATH_TOKEN_REFRESH, body).await
    }

    async fn get_shop_info(
        &self,
        access_token: &str,
        shop_id: &str,
    ) -> Result<ShopInfo, AppError> {
        self.get_envelope::<ShopInfo>(
            PATH_SHOP_INFO,
            Some(access_token),
            Some(shop_id),
            &[],
            TIMEOUT_LIGHT,
        )
        .await
    }

    async fn list_items(
        &self,
        access_token: &str,
        shop_id: &str,
        page_size: i64,
        offset: i64,
        status: ItemStatus,
    ) -> Result<ItemPage, AppError> {
        let extra = [
            ("item_status", status.as_str().to_string()),
            ("page_size", page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        let resp: model::ItemListResponse = self
            .get_envelope(
                PATH_ITEM_LIST,
                Some(access_token),
                Some(shop_id),
                &extra,
                TIMEOUT_LIST,
            )
            .await?;
        Ok(ItemPage {
            items: resp.item,
            total_count: resp.total_count,
            has_next_page: resp.has_next_page,
        })
    }

    async fn get_item_details(
        &self,
        access_token: &str,
        shop_id: &str,
        item_ids: &[i64],
    ) -> Result<Vec<ItemDetail>, AppError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = item_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let extra = [
            ("item_id_list", joined),
            ("need_tax_info", "false".to_string()),
            ("need_complaint_policy", "false".to_string()),
        ];
        let resp: model::ItemDetailResponse = self
            .get_envelope(
                PATH_ITEM_BASE_INFO,
                Some(access_token),
                Some(shop_id),
                &extra,
                TIMEOUT_DETAIL,
            )
            .await?;

        // Partial progress beats all-or-nothing: drop entries that fail to
        // parse instead of aborting the page.
        let mut details = Vec::with_capacity(resp.item_list.len());
        for raw in resp.item_list {
            match serde_json::from_value::<ItemDetail>(raw.clone()) {
                Ok(mut detail) => {
                    detail.raw = raw;
                    details.push(detail);
                }
                Err(err) => warn!(%err, "skipping unparseable item detail"),
            }
        }
        Ok(details)
    }

    async fn list_orders(
        &self,
        access_token: &str,
        shop_id: &str,
        time_from: i64,
        time_to: i64,
        page_size: i64,
        cursor: &str,
        status: Option<OrderStatus>,
    ) -> Result<OrderPage, AppError> {
        // Clamp to the widest window the remote accepts.
        let time_from = time_from.max(time_to - MAX_ORDER_WINDOW_SECS);
        let mut extra = vec![
            ("time_range_field", "create_time".to_string()),
            ("time_from", time_from.to_string()),
            ("time_to", time_to.to_string()),
            ("page_size", page_size.to_string()),
            ("cursor", cursor.to_string()),
        ];
        if let Some(st) = status {
            extra.push(("order_status", st.as_str().to_string()));
        }
        let resp: model::OrderListResponse = self
            .get_envelope(
                PATH_ORDER_LIST,
                Some(access_token),
                Some(shop_id),
                &extra,
                TIMEOUT_LIST,
            )
            .await?;
        Ok(OrderPage {
            orders: resp.order_list,
            has_next_page: resp.more,
            next_cursor: resp.next_cursor,
        })
    }

    async fn get_order_details(
        &self,
        access_token: &str,
        shop_id: &str,
        order_sns: &[String],
    ) -> Result<Vec<OrderDetail>, AppError> {
        if order_sns.is_empty() {
            return Ok(Vec::new());
        }
        let extra = [
            ("order_sn_list", order_sns.join(",")),
            (
                "response_optional_fields",
                ORDER_DETAIL_OPTIONAL_FIELDS.to_string(),
            ),
        ];
        let resp: model::OrderDetailResponse = self
            .get_envelope(
                PATH_ORDER_DETAIL,
                Some(access_token),
                Some(shop_id),
                &extra,
                TIMEOUT_DETAIL,
            )
            .await?;

        let mut details = Vec::with_capacity(resp.order_list.len());
        for raw in resp.order_list {
            match serde_json::from_value::<OrderDetail>(raw.clone()) {
                Ok(mut detail) => {
                    detail.raw = raw;
                    details.push(detail);
                }
                Err(err) => warn!(%err, "skipping unparseable order detail"),
            }
        }
        Ok(details)
    }
}
