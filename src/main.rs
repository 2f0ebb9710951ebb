use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shopsync::config;
use shopsync::db;
use shopsync::http::{self, AppState};
use shopsync::shopee::ShopeeClient;
use shopsync::sync::SyncEngine;
use shopsync::tokens::TokenManager;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/shopsync.db", cfg.app.data_dir));

    let pool = db::repo::init_pool(&database_url).await?;
    db::repo::run_migrations(&pool).await?;

    let api: Arc<ShopeeClient> = Arc::new(ShopeeClient::from_config(&cfg.shopee)?);
    let tokens = Arc::new(TokenManager::new(pool.clone(), api.clone()));
    let sync = Arc::new(SyncEngine::new(
        pool.clone(),
        api.clone(),
        tokens.clone(),
        cfg.sync.clone(),
    ));

    // Opportunistic token keep-alive; a skipped cycle is harmless because
    // every sync re-checks freshness itself.
    tokio::spawn(
        tokens
            .clone()
            .run_periodic_refresh(cfg.sync.token_refresh_interval_secs),
    );

    let state = AppState {
        pool,
        api,
        tokens,
        sync,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
