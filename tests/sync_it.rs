mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{engine, setup_pool, test_settings, ScriptedApi};
use shopsync::db::{self, OrderFilter, ProductFilter};
use shopsync::model::{OrderStatus, SyncStatus, SyncType};
use shopsync::sync::OrderSyncRequest;

const DAY: i64 = 24 * 60 * 60;

#[tokio::test]
async fn product_sync_pages_sequentially_until_exhausted() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let api = Arc::new(ScriptedApi::with_items(120));
    let engine = engine(&pool, api.clone(), test_settings());

    let outcome = engine.sync_products().await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.total_synced, 120);

    // 120 items at page size 50: exactly three list calls.
    assert_eq!(*api.item_list_offsets.lock().unwrap(), vec![0, 50, 100]);

    let filter = ProductFilter {
        limit: 200,
        ..Default::default()
    };
    assert_eq!(db::repo::count_products(&pool, &filter).await.unwrap(), 120);

    let runs = db::repo::list_sync_runs(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].sync_type, SyncType::Products);
    assert_eq!(runs[0].status, SyncStatus::Success);
    assert_eq!(runs[0].items_count, 120);
}

#[tokio::test]
async fn mid_run_failure_keeps_prior_pages_as_partial() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let mut api = ScriptedApi::with_items(120);
    api.fail_on_item_offset = Some(100);
    let api = Arc::new(api);
    let engine = engine(&pool, api, test_settings());

    let outcome = engine.sync_products().await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Partial);
    assert_eq!(outcome.total_synced, 100);

    // The first two pages stay persisted.
    let filter = ProductFilter {
        limit: 200,
        ..Default::default()
    };
    assert_eq!(db::repo::count_products(&pool, &filter).await.unwrap(), 100);

    let runs = db::repo::list_sync_runs(&pool, 10).await.unwrap();
    assert_eq!(runs[0].status, SyncStatus::Partial);
    assert_eq!(runs[0].items_count, 100);
    assert!(runs[0].error_message.as_deref().unwrap().contains("injected"));
}

#[tokio::test]
async fn first_page_failure_is_a_failed_run() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let mut api = ScriptedApi::with_items(120);
    api.fail_on_item_offset = Some(0);
    let engine = engine(&pool, Arc::new(api), test_settings());

    assert!(engine.sync_products().await.is_err());

    let runs = db::repo::list_sync_runs(&pool, 10).await.unwrap();
    assert_eq!(runs[0].status, SyncStatus::Failed);
    assert_eq!(runs[0].items_count, 0);
}

#[tokio::test]
async fn unfiltered_order_sync_scans_every_status_and_dedups() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let mut api = ScriptedApi::default();
    // The same order shows up under two status filters.
    api.orders_by_status.insert(
        OrderStatus::Completed,
        vec!["SN-1".into(), "SN-2".into()],
    );
    api.orders_by_status
        .insert(OrderStatus::ToShip, vec!["SN-2".into(), "SN-3".into()]);
    let api = Arc::new(api);
    let engine = engine(&pool, api.clone(), test_settings());

    let outcome = engine
        .sync_orders(OrderSyncRequest {
            days: Some(7),
            status: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.total_synced, 3);

    // One window, one list call per enumerated status.
    let calls = api.order_list_calls.lock().unwrap();
    assert_eq!(calls.len(), OrderStatus::SCAN_SET.len());
    let scanned: HashSet<_> = calls.iter().map(|(_, _, st)| st.unwrap()).collect();
    assert_eq!(scanned.len(), OrderStatus::SCAN_SET.len());
    drop(calls);

    // SN-2 fetched in detail exactly once.
    let detail_sns: Vec<String> = api
        .order_detail_calls
        .lock()
        .unwrap()
        .iter()
        .flatten()
        .cloned()
        .collect();
    assert_eq!(
        detail_sns.iter().filter(|sn| sn.as_str() == "SN-2").count(),
        1
    );

    let filter = OrderFilter {
        limit: 10,
        ..Default::default()
    };
    assert_eq!(db::repo::count_orders(&pool, &filter).await.unwrap(), 3);
}

#[tokio::test]
async fn ninety_day_request_is_covered_by_capped_windows() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let api = Arc::new(ScriptedApi::default());
    let engine = engine(&pool, api.clone(), test_settings());

    let before = chrono::Utc::now().timestamp();
    engine
        .sync_orders(OrderSyncRequest {
            days: Some(90),
            status: Some(OrderStatus::Completed),
        })
        .await
        .unwrap();
    let after = chrono::Utc::now().timestamp();

    let calls = api.order_list_calls.lock().unwrap();
    assert_eq!(calls.len(), 6);
    for (from, to, _) in calls.iter() {
        assert!(to - from <= 15 * DAY);
    }
    // Newest window ends at "now", oldest starts 90 days back, and the
    // windows tile the range without gaps.
    assert!(calls[0].1 >= before && calls[0].1 <= after);
    assert!(calls[5].0 >= before - 90 * DAY && calls[5].0 <= after - 90 * DAY);
    for pair in calls.windows(2) {
        assert_eq!(pair[0].0, pair[1].1);
    }
}

#[tokio::test]
async fn stale_credential_refreshes_once_before_sync() {
    let pool = setup_pool().await;
    // 200s of validity left is inside the 300s safety margin.
    db::repo::save_credential(&pool, "1", "stale", "ref", 200, None)
        .await
        .unwrap();
    let api = Arc::new(ScriptedApi::with_items(10));
    let engine = engine(&pool, api.clone(), test_settings());

    let outcome = engine.sync_products().await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(api.refresh_count(), 1);

    let cred = db::repo::get_credential(&pool, "1").await.unwrap().unwrap();
    assert_eq!(cred.access_token, "refreshed-0");
}

#[tokio::test]
async fn mid_run_token_rejection_refreshes_and_retries_once() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let api = ScriptedApi::with_items(10);
    api.reject_token_once
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let api = Arc::new(api);
    let engine = engine(&pool, api.clone(), test_settings());

    let outcome = engine.sync_products().await.unwrap();
    assert_eq!(outcome.status, SyncStatus::Success);
    assert_eq!(outcome.total_synced, 10);
    assert_eq!(api.refresh_count(), 1);

    // The rejected call was repeated at the same offset.
    assert_eq!(*api.item_list_offsets.lock().unwrap(), vec![0, 0]);
}

#[tokio::test]
async fn order_detail_calls_are_stateless_per_call() {
    let pool = setup_pool().await;
    db::repo::save_credential(&pool, "1", "tok", "ref", 14400, None)
        .await
        .unwrap();
    let api = ScriptedApi::default();

    // An order_sn never returned by any list call still resolves.
    use shopsync::shopee::ShopeeApi;
    let details = api
        .get_order_details("tok", "1", &["NEVER-LISTED".into()])
        .await
        .unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].order_sn, "NEVER-LISTED");
    drop(pool);
}
