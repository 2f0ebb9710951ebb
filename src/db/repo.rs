use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

use super::model::{
    CacheStats, Credential, NewOrder, NewProduct, Order, OrderFilter, Product, ProductFilter,
    SyncRun,
};
use crate::error::AppError;
use crate::model::{ItemStatus, OrderStatus, SyncStatus, SyncType};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, AppError> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // WAL plus full sync keeps the cache durable across crashes.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, ensure the parent directory exists so a
/// fresh deployment can open its database. In-memory and non-sqlite URLs
/// pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let path_with_query = rest.trim_start_matches("//");
    let path_part = path_with_query
        .split_once('?')
        .map(|(p, _)| p)
        .unwrap_or(path_with_query);
    if let Some(parent) = std::path::Path::new(path_part).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
    url.to_string()
}

pub async fn run_migrations(pool: &Pool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Storage(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Credentials

#[instrument(skip_all)]
pub async fn save_credential(
    pool: &Pool,
    shop_id: &str,
    access_token: &str,
    refresh_token: &str,
    expires_in: i64,
    shop_name: Option<&str>,
) -> Result<(), AppError> {
    let expires_at = Utc::now().timestamp() + expires_in;
    // Upsert by shop_id: refresh mutates the same row in place and keeps
    // the original connected_at and shop_name when absent.
    sqlx::query(
        "INSERT INTO credentials (shop_id, access_token, refresh_token, expires_at, shop_name) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(shop_id) DO UPDATE SET \
           access_token = excluded.access_token, \
           refresh_token = excluded.refresh_token, \
           expires_at = excluded.expires_at, \
           shop_name = COALESCE(excluded.shop_name, credentials.shop_name), \
           updated_at = CURRENT_TIMESTAMP",
    )
    .bind(shop_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .bind(shop_name)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_credential(pool: &Pool, shop_id: &str) -> Result<Option<Credential>, AppError> {
    let row = sqlx::query(
        "SELECT shop_id, access_token, refresh_token, expires_at, shop_name, connected_at \
         FROM credentials WHERE shop_id = ?",
    )
    .bind(shop_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(credential_from_row))
}

/// The most recently connected credential. The dashboard is single-shop,
/// so handlers resolve the active shop through this instead of a global.
#[instrument(skip_all)]
pub async fn current_credential(pool: &Pool) -> Result<Option<Credential>, AppError> {
    let row = sqlx::query(
        "SELECT shop_id, access_token, refresh_token, expires_at, shop_name, connected_at \
         FROM credentials ORDER BY connected_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(credential_from_row))
}

fn credential_from_row(row: sqlx::sqlite::SqliteRow) -> Credential {
    Credential {
        shop_id: row.get("shop_id"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        shop_name: row.get("shop_name"),
        connected_at: row.get("connected_at"),
    }
}

// ---------------------------------------------------------------------------
// Products

#[instrument(skip_all, fields(count = products.len()))]
pub async fn upsert_products(pool: &Pool, products: &[NewProduct]) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;
    let mut saved = 0u64;
    for p in products {
        sqlx::query(
            "INSERT INTO products (item_id, name, sku, status, current_price, original_price, \
                stock_available, stock_reserved, sales_count, view_count, rating_star, \
                rating_count, image_urls, create_time, update_time, last_synced, raw_payload) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, ?) \
             ON CONFLICT(item_id) DO UPDATE SET \
               name = excluded.name, sku = excluded.sku, status = excluded.status, \
               current_price = excluded.current_price, original_price = excluded.original_price, \
               stock_available = excluded.stock_available, stock_reserved = excluded.stock_reserved, \
               sales_count = excluded.sales_count, view_count = excluded.view_count, \
               rating_star = excluded.rating_star, rating_count = excluded.rating_count, \
               image_urls = excluded.image_urls, create_time = excluded.create_time, \
               update_time = excluded.update_time, last_synced = CURRENT_TIMESTAMP, \
               raw_payload = excluded.raw_payload",
        )
        .bind(p.item_id)
        .bind(&p.name)
        .bind(&p.sku)
        .bind(p.status.as_str())
        .bind(p.current_price)
        .bind(p.original_price)
        .bind(p.stock_available)
        .bind(p.stock_reserved)
        .bind(p.sales_count)
        .bind(p.view_count)
        .bind(p.rating_star)
        .bind(p.rating_count)
        .bind(serde_json::to_string(&p.image_urls).unwrap_or_else(|_| "[]".into()))
        .bind(p.create_time)
        .bind(p.update_time)
        .bind(p.raw_payload.to_string())
        .execute(&mut *tx)
        .await?;
        saved += 1;
    }
    tx.commit().await?;
    Ok(saved)
}

#[instrument(skip_all)]
pub async fn get_products(pool: &Pool, filter: &ProductFilter) -> Result<Vec<Product>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT item_id, name, sku, status, current_price, original_price, stock_available, \
         stock_reserved, sales_count, view_count, rating_star, rating_count, image_urls, \
         create_time, update_time, last_synced FROM products WHERE 1=1",
    );
    push_product_filters(&mut qb, filter);
    qb.push(" ORDER BY update_time DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows.into_iter().map(product_from_row).collect())
}

#[instrument(skip_all)]
pub async fn get_product(pool: &Pool, item_id: i64) -> Result<Option<Product>, AppError> {
    let row = sqlx::query(
        "SELECT item_id, name, sku, status, current_price, original_price, stock_available, \
         stock_reserved, sales_count, view_count, rating_star, rating_count, image_urls, \
         create_time, update_time, last_synced FROM products WHERE item_id = ?",
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(product_from_row))
}

#[instrument(skip_all)]
pub async fn count_products(pool: &Pool, filter: &ProductFilter) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM products WHERE 1=1");
    push_product_filters(&mut qb, filter);
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

fn push_product_filters(qb: &mut QueryBuilder<Sqlite>, filter: &ProductFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        qb.push(" AND (name LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR CAST(item_id AS TEXT) LIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

fn product_from_row(row: sqlx::sqlite::SqliteRow) -> Product {
    let image_urls: String = row.get("image_urls");
    let status: String = row.get("status");
    Product {
        item_id: row.get("item_id"),
        name: row.get("name"),
        sku: row.get("sku"),
        status: ItemStatus::parse(&status),
        current_price: row.get("current_price"),
        original_price: row.get("original_price"),
        stock_available: row.get("stock_available"),
        stock_reserved: row.get("stock_reserved"),
        sales_count: row.get("sales_count"),
        view_count: row.get("view_count"),
        rating_star: row.get("rating_star"),
        rating_count: row.get("rating_count"),
        image_urls: serde_json::from_str(&image_urls).unwrap_or_default(),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
        last_synced: row.get("last_synced"),
    }
}

// ---------------------------------------------------------------------------
// Orders

#[instrument(skip_all, fields(count = orders.len()))]
pub async fn upsert_orders(pool: &Pool, orders: &[NewOrder]) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;
    let mut saved = 0u64;
    for o in orders {
        sqlx::query(
            "INSERT INTO orders (order_sn, status, buyer_username, total_amount, shipping_fee, \
                item_count, payment_method, recipient_address, line_items, create_time, \
                update_time, last_synced, raw_payload) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, ?) \
             ON CONFLICT(order_sn) DO UPDATE SET \
               status = excluded.status, buyer_username = excluded.buyer_username, \
               total_amount = excluded.total_amount, shipping_fee = excluded.shipping_fee, \
               item_count = excluded.item_count, payment_method = excluded.payment_method, \
               recipient_address = excluded.recipient_address, line_items = excluded.line_items, \
               create_time = excluded.create_time, update_time = excluded.update_time, \
               last_synced = CURRENT_TIMESTAMP, raw_payload = excluded.raw_payload",
        )
        .bind(&o.order_sn)
        .bind(o.status.as_str())
        .bind(&o.buyer_username)
        .bind(o.total_amount)
        .bind(o.shipping_fee)
        .bind(o.item_count)
        .bind(&o.payment_method)
        .bind(o.recipient_address.to_string())
        .bind(serde_json::to_string(&o.line_items).unwrap_or_else(|_| "[]".into()))
        .bind(o.create_time)
        .bind(o.update_time)
        .bind(o.raw_payload.to_string())
        .execute(&mut *tx)
        .await?;
        saved += 1;
    }
    tx.commit().await?;
    Ok(saved)
}

#[instrument(skip_all)]
pub async fn get_orders(pool: &Pool, filter: &OrderFilter) -> Result<Vec<Order>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT order_sn, status, buyer_username, total_amount, shipping_fee, item_count, \
         payment_method, recipient_address, line_items, create_time, update_time, last_synced \
         FROM orders WHERE 1=1",
    );
    push_order_filters(&mut qb, filter);
    qb.push(" ORDER BY create_time DESC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows.into_iter().map(order_from_row).collect())
}

#[instrument(skip_all)]
pub async fn count_orders(pool: &Pool, filter: &OrderFilter) -> Result<i64, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM orders WHERE 1=1");
    push_order_filters(&mut qb, filter);
    let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
    Ok(count)
}

fn push_order_filters(qb: &mut QueryBuilder<Sqlite>, filter: &OrderFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.as_str());
    }
    if let Some(days) = filter.days {
        let cutoff = Utc::now().timestamp() - days * 24 * 60 * 60;
        qb.push(" AND create_time >= ");
        qb.push_bind(cutoff);
    }
}

fn order_from_row(row: sqlx::sqlite::SqliteRow) -> Order {
    let status: String = row.get("status");
    let address: String = row.get("recipient_address");
    let line_items: String = row.get("line_items");
    Order {
        order_sn: row.get("order_sn"),
        status: OrderStatus::parse(&status),
        buyer_username: row.get("buyer_username"),
        total_amount: row.get("total_amount"),
        shipping_fee: row.get("shipping_fee"),
        item_count: row.get("item_count"),
        payment_method: row.get("payment_method"),
        recipient_address: serde_json::from_str(&address)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
        line_items: serde_json::from_str(&line_items).unwrap_or_default(),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
        last_synced: row.get("last_synced"),
    }
}

// ---------------------------------------------------------------------------
// Sync runs

#[instrument(skip_all)]
pub async fn start_sync_run(pool: &Pool, sync_type: SyncType) -> Result<i64, AppError> {
    let row = sqlx::query("INSERT INTO sync_runs (sync_type, status) VALUES (?, 'pending') RETURNING id")
        .bind(sync_type.as_str())
        .fetch_one(pool)
        .await?;
    Ok(row.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn finish_sync_run(
    pool: &Pool,
    id: i64,
    status: SyncStatus,
    items_count: i64,
    error_message: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE sync_runs SET status = ?, items_count = ?, error_message = ?, \
         finished_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(items_count)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_sync_runs(pool: &Pool, limit: i64) -> Result<Vec<SyncRun>, AppError> {
    let rows = sqlx::query(
        "SELECT id, sync_type, items_count, status, error_message, started_at, finished_at \
         FROM sync_runs ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let sync_type: String = row.get("sync_type");
            let status: String = row.get("status");
            SyncRun {
                id: row.get("id"),
                sync_type: if sync_type == "orders" {
                    SyncType::Orders
                } else {
                    SyncType::Products
                },
                items_count: row.get("items_count"),
                status: SyncStatus::parse(&status).unwrap_or(SyncStatus::Failed),
                error_message: row.get("error_message"),
                started_at: row.get("started_at"),
                finished_at: row.get::<Option<DateTime<Utc>>, _>("finished_at"),
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Aggregates

#[instrument(skip_all)]
pub async fn cache_stats(pool: &Pool) -> Result<CacheStats, AppError> {
    let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(pool)
        .await?;
    let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await?;
    let total_revenue: f64 =
        sqlx::query_scalar("SELECT COALESCE(SUM(total_amount), 0.0) FROM orders")
            .fetch_one(pool)
            .await?;

    let products_by_status = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM products GROUP BY status ORDER BY n DESC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
    .collect();

    let orders_by_status = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM orders GROUP BY status ORDER BY n DESC",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
    .collect();

    Ok(CacheStats {
        product_count,
        products_by_status,
        order_count,
        orders_by_status,
        total_revenue,
    })
}
