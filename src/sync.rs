//! Sync orchestration: pull remote catalog and order data into the cache.
//!
//! Pages are fetched strictly sequentially with a throttle delay between
//! them, each page is persisted before the next is requested, and a
//! mid-run failure downgrades the run to `partial` instead of discarding
//! pages already written.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config;
use crate::db::{self, Credential, NewOrder, NewProduct, Pool};
use crate::error::AppError;
use crate::model::{ItemStatus, OrderStatus, SyncStatus, SyncType};
use crate::shopee::ShopeeApi;
use crate::tokens::TokenManager;

/// Order-detail endpoint accepts at most this many order_sn per call.
const ORDER_DETAIL_BATCH: usize = 50;

/// One running sync per entity type. Products and orders may overlap
/// each other but never themselves.
#[derive(Default)]
pub struct SyncGate {
    products: AtomicBool,
    orders: AtomicBool,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, sync_type: SyncType) -> &AtomicBool {
        match sync_type {
            SyncType::Products => &self.products,
            SyncType::Orders => &self.orders,
        }
    }

    pub fn try_acquire(&self, sync_type: SyncType) -> Result<SyncPermit<'_>, AppError> {
        let flag = self.flag(sync_type);
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AppError::SyncInFlight(sync_type.as_str()));
        }
        Ok(SyncPermit { flag })
    }
}

/// Releases the gate when dropped, including on early error returns.
pub struct SyncPermit<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Result of one completed (or partially completed) run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub total_synced: i64,
    pub status: SyncStatus,
}

/// Requested scope of an order sync.
#[derive(Debug, Clone, Default)]
pub struct OrderSyncRequest {
    pub days: Option<i64>,
    pub status: Option<OrderStatus>,
}

pub struct SyncEngine {
    pool: Pool,
    api: Arc<dyn ShopeeApi>,
    tokens: Arc<TokenManager>,
    settings: config::Sync,
    gate: SyncGate,
}

impl SyncEngine {
    pub fn new(
        pool: Pool,
        api: Arc<dyn ShopeeApi>,
        tokens: Arc<TokenManager>,
        settings: config::Sync,
    ) -> Self {
        Self {
            pool,
            api,
            tokens,
            settings,
            gate: SyncGate::new(),
        }
    }

    #[instrument(skip_all)]
    pub async fn sync_products(&self) -> Result<SyncOutcome, AppError> {
        let _permit = self.gate.try_acquire(SyncType::Products)?;
        let mut cred = self.tokens.ensure_fresh().await?;
        let run_id = db::repo::start_sync_run(&self.pool, SyncType::Products).await?;

        let mut persisted = 0i64;
        let result = self.product_pages(&mut cred, &mut persisted).await;
        self.finalize(run_id, SyncType::Products, persisted, result)
            .await
    }

    #[instrument(skip_all, fields(days = request.days, status = ?request.status))]
    pub async fn sync_orders(&self, request: OrderSyncRequest) -> Result<SyncOutcome, AppError> {
        let _permit = self.gate.try_acquire(SyncType::Orders)?;
        let mut cred = self.tokens.ensure_fresh().await?;
        let run_id = db::repo::start_sync_run(&self.pool, SyncType::Orders).await?;

        let mut persisted = 0i64;
        let result = self.order_pages(&mut cred, &request, &mut persisted).await;
        self.finalize(run_id, SyncType::Orders, persisted, result)
            .await
    }

    /// Run one remote call; if the token was rejected mid-run, refresh
    /// once and retry. A second rejection surfaces to the caller as
    /// "reconnect required".
    async fn call_with_refresh<T, F, Fut>(
        &self,
        cred: &mut Credential,
        mut call: F,
    ) -> Result<T, AppError>
    where
        F: FnMut(String, String) -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        match call(cred.access_token.clone(), cred.shop_id.clone()).await {
            Err(AppError::TokenExpired) => {
                warn!("token rejected mid-run, refreshing and retrying once");
                *cred = self
                    .tokens
                    .force_refresh(&cred.shop_id, &cred.access_token)
                    .await?;
                call(cred.access_token.clone(), cred.shop_id.clone()).await
            }
            res => res,
        }
    }

    /// Shared run bookkeeping. A failure after at least one persisted
    /// page is reported as a partial success; a failure before any
    /// persistence surfaces the error.
    async fn finalize(
        &self,
        run_id: i64,
        sync_type: SyncType,
        persisted: i64,
        result: Result<(), AppError>,
    ) -> Result<SyncOutcome, AppError> {
        match result {
            Ok(()) => {
                db::repo::finish_sync_run(&self.pool, run_id, SyncStatus::Success, persisted, None)
                    .await?;
                info!(sync_type = sync_type.as_str(), persisted, "sync complete");
                Ok(SyncOutcome {
                    total_synced: persisted,
                    status: SyncStatus::Success,
                })
            }
            Err(err) if persisted > 0 => {
                warn!(sync_type = sync_type.as_str(), persisted, %err, "sync interrupted, keeping partial progress");
                db::repo::finish_sync_run(
                    &self.pool,
                    run_id,
                    SyncStatus::Partial,
                    persisted,
                    Some(&err.to_string()),
                )
                .await?;
                Ok(SyncOutcome {
                    total_synced: persisted,
                    status: SyncStatus::Partial,
                })
            }
            Err(err) => {
                db::repo::finish_sync_run(
                    &self.pool,
                    run_id,
                    SyncStatus::Failed,
                    0,
                    Some(&err.to_string()),
                )
                .await?;
                Err(err)
            }
        }
    }

    async fn product_pages(
        &self,
        cred: &mut Credential,
        persisted: &mut i64,
    ) -> Result<(), AppError> {
        let page_size = self.settings.product_page_size;
        let mut offset = 0i64;
        loop {
            let api = self.api.clone();
            let page = self
                .call_with_refresh(cred, move |token, shop| {
                    let api = api.clone();
                    async move {
                        api.list_items(&token, &shop, page_size, offset, ItemStatus::Normal)
                            .await
                    }
                })
                .await?;

            let ids: Vec<i64> = page.items.iter().map(|i| i.item_id).collect();
            if !ids.is_empty() {
                let api = self.api.clone();
                let ids = Arc::new(ids);
                let details = self
                    .call_with_refresh(cred, move |token, shop| {
                        let api = api.clone();
                        let ids = ids.clone();
                        async move { api.get_item_details(&token, &shop, &ids).await }
                    })
                    .await?;
                let rows: Vec<NewProduct> = details.iter().map(NewProduct::from_detail).collect();
                *persisted += db::repo::upsert_products(&self.pool, &rows).await? as i64;
            }

            if !page.has_next_page {
                return Ok(());
            }
            offset += page_size;
            tokio::time::sleep(Duration::from_millis(self.settings.page_delay_ms)).await;
        }
    }

    async fn order_pages(
        &self,
        cred: &mut Credential,
        request: &OrderSyncRequest,
        persisted: &mut i64,
    ) -> Result<(), AppError> {
        let days = request
            .days
            .unwrap_or(self.settings.default_order_days)
            .max(1);
        let now = chrono::Utc::now().timestamp();
        let windows = order_windows(
            now - days * 24 * 60 * 60,
            now,
            self.settings.order_window_days * 24 * 60 * 60,
        );
        let statuses: Vec<Option<OrderStatus>> = match request.status {
            Some(st) => vec![Some(st)],
            // An unfiltered sync fans out one scan per known status; the
            // list endpoint has no true ALL filter.
            None => OrderStatus::SCAN_SET.iter().map(|s| Some(*s)).collect(),
        };

        let mut seen: HashSet<String> = HashSet::new();
        for (time_from, time_to) in windows {
            for (idx, status) in statuses.iter().enumerate() {
                if idx > 0 {
                    tokio::time::sleep(Duration::from_millis(self.settings.status_scan_delay_ms))
                        .await;
                }
                self.order_window_scan(cred, time_from, time_to, *status, &mut seen, persisted)
                    .await?;
            }
        }
        Ok(())
    }

    async fn order_window_scan(
        &self,
        cred: &mut Credential,
        time_from: i64,
        time_to: i64,
        status: Option<OrderStatus>,
        seen: &mut HashSet<String>,
        persisted: &mut i64,
    ) -> Result<(), AppError> {
        let page_size = self.settings.order_page_size;
        let mut cursor = String::new();
        loop {
            let api = self.api.clone();
            let page_cursor = cursor.clone();
            let page = self
                .call_with_refresh(cred, move |token, shop| {
                    let api = api.clone();
                    let cursor = page_cursor.clone();
                    async move {
                        api.list_orders(&token, &shop, time_from, time_to, page_size, &cursor, status)
                            .await
                    }
                })
                .await?;

            // Statuses overlap across scans; persist each order once.
            let fresh: Vec<String> = page
                .orders
                .iter()
                .filter(|o| seen.insert(o.order_sn.clone()))
                .map(|o| o.order_sn.clone())
                .collect();

            for batch in fresh.chunks(ORDER_DETAIL_BATCH) {
                let api = self.api.clone();
                let batch = Arc::new(batch.to_vec());
                let details = self
                    .call_with_refresh(cred, move |token, shop| {
                        let api = api.clone();
                        let batch = batch.clone();
                        async move { api.get_order_details(&token, &shop, &batch).await }
                    })
                    .await?;
                let rows: Vec<NewOrder> = details.iter().map(NewOrder::from_detail).collect();
                *persisted += db::repo::upsert_orders(&self.pool, &rows).await? as i64;
            }

            if !page.has_next_page || page.next_cursor.is_empty() {
                return Ok(());
            }
            cursor = page.next_cursor;
            tokio::time::sleep(Duration::from_millis(self.settings.page_delay_ms)).await;
        }
    }
}

/// Split `[from, to]` into consecutive windows no wider than
/// `max_window_secs`, newest first.
fn order_windows(from: i64, to: i64, max_window_secs: i64) -> Vec<(i64, i64)> {
    let mut windows = Vec::new();
    let mut hi = to;
    while hi > from {
        let lo = (hi - max_window_secs).max(from);
        windows.push((lo, hi));
        hi = lo;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 24 * 60 * 60;

    #[test]
    fn gate_refuses_second_acquire_until_drop() {
        let gate = SyncGate::new();
        let permit = gate.try_acquire(SyncType::Products).unwrap();
        assert!(matches!(
            gate.try_acquire(SyncType::Products),
            Err(AppError::SyncInFlight("products"))
        ));
        // Other entity type is independent.
        let orders_permit = gate.try_acquire(SyncType::Orders).unwrap();
        drop(orders_permit);

        drop(permit);
        assert!(gate.try_acquire(SyncType::Products).is_ok());
    }

    #[test]
    fn windows_cover_long_ranges_in_capped_slices() {
        let to = 1_700_000_000;
        let from = to - 90 * DAY;
        let windows = order_windows(from, to, 15 * DAY);
        assert_eq!(windows.len(), 6);
        assert_eq!(windows[0], (to - 15 * DAY, to));
        assert_eq!(windows[5].0, from);
        for (lo, hi) in &windows {
            assert!(hi - lo <= 15 * DAY);
        }
        // Consecutive windows tile the range without gaps.
        for pair in windows.windows(2) {
            assert_eq!(pair[0].0, pair[1].1);
        }
    }

    #[test]
    fn short_range_is_a_single_window() {
        let to = 1_700_000_000;
        let windows = order_windows(to - 3 * DAY, to, 15 * DAY);
        assert_eq!(windows, vec![(to - 3 * DAY, to)]);
    }
}
