//! Access-token lifecycle: connect, validity checks, single-flight refresh.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::db::{self, Credential, Pool};
use crate::error::AppError;
use crate::shopee::{ShopInfo, ShopeeApi};

/// Owns the credential row and keeps its access token usable. Refreshes
/// run single-flight: concurrent callers that find a stale token queue on
/// one refresh instead of issuing duplicates.
pub struct TokenManager {
    pool: Pool,
    api: Arc<dyn ShopeeApi>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(pool: Pool, api: Arc<dyn ShopeeApi>) -> Self {
        Self {
            pool,
            api,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Complete the OAuth callback: trade the code for tokens, persist
    /// them, then best-effort fetch the shop's display name. A failed
    /// metadata fetch never fails the connection.
    #[instrument(skip_all, fields(shop_id))]
    pub async fn connect(&self, code: &str, shop_id: &str) -> Result<ShopInfo, AppError> {
        let pair = self.api.exchange_code_for_token(code, shop_id).await?;
        db::repo::save_credential(
            &self.pool,
            shop_id,
            &pair.access_token,
            &pair.refresh_token,
            pair.expires_in,
            None,
        )
        .await?;
        info!(shop_id, "shop connected");

        let info = match self.api.get_shop_info(&pair.access_token, shop_id).await {
            Ok(info) => {
                if let Some(name) = info.shop_name.as_deref() {
                    db::repo::save_credential(
                        &self.pool,
                        shop_id,
                        &pair.access_token,
                        &pair.refresh_token,
                        pair.expires_in,
                        Some(name),
                    )
                    .await?;
                }
                info
            }
            Err(err) => {
                warn!(%err, "shop info fetch failed, using placeholder");
                ShopInfo::placeholder(shop_id)
            }
        };
        Ok(info)
    }

    /// A credential whose access token is valid for at least the safety
    /// margin, refreshing first when needed.
    #[instrument(skip_all)]
    pub async fn ensure_fresh(&self) -> Result<Credential, AppError> {
        let cred = db::repo::current_credential(&self.pool)
            .await?
            .ok_or(AppError::NotConnected)?;
        if !Credential::is_expired(cred.expires_at, chrono::Utc::now().timestamp()) {
            return Ok(cred);
        }
        self.refresh(&cred.shop_id).await
    }

    /// Refresh the credential for one shop. Callers that lose the race
    /// re-read the row and reuse the winner's token.
    #[instrument(skip_all, fields(shop_id))]
    pub async fn refresh(&self, shop_id: &str) -> Result<Credential, AppError> {
        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited.
        let cred = db::repo::get_credential(&self.pool, shop_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        if !Credential::is_expired(cred.expires_at, chrono::Utc::now().timestamp()) {
            return Ok(cred);
        }

        self.refresh_locked(&cred).await
    }

    /// Refresh even when the token is nominally fresh, for tokens the
    /// remote rejected mid-run. Skipped when the stored token already
    /// differs from the rejected one (someone else refreshed first).
    #[instrument(skip_all, fields(shop_id))]
    pub async fn force_refresh(
        &self,
        shop_id: &str,
        rejected_token: &str,
    ) -> Result<Credential, AppError> {
        let _guard = self.refresh_lock.lock().await;

        let cred = db::repo::get_credential(&self.pool, shop_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        if cred.access_token != rejected_token {
            return Ok(cred);
        }
        self.refresh_locked(&cred).await
    }

    // Caller holds `refresh_lock`.
    async fn refresh_locked(&self, cred: &Credential) -> Result<Credential, AppError> {
        let pair = self
            .api
            .refresh_token(&cred.shop_id, &cred.refresh_token)
            .await?;
        db::repo::save_credential(
            &self.pool,
            &cred.shop_id,
            &pair.access_token,
            &pair.refresh_token,
            pair.expires_in,
            None,
        )
        .await?;
        info!(shop_id = %cred.shop_id, "access token refreshed");

        db::repo::get_credential(&self.pool, &cred.shop_id)
            .await?
            .ok_or(AppError::NotConnected)
    }

    /// Periodic keep-alive. Refreshes whatever credential exists on every
    /// tick, skipping quietly while nothing is connected and keeping the
    /// old credential around when the remote rejects a refresh.
    pub async fn run_periodic_refresh(self: Arc<Self>, interval_secs: u64) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match db::repo::current_credential(&self.pool).await {
                Ok(Some(cred)) => {
                    // Unconditional: the tick period is shorter than the
                    // token lifetime, so expiry-gated refresh would skip.
                    if let Err(err) = self.force_refresh(&cred.shop_id, &cred.access_token).await {
                        error!(%err, shop_id = %cred.shop_id, "periodic token refresh failed");
                    }
                }
                Ok(None) => {}
                Err(err) => error!(%err, "could not load credential for periodic refresh"),
            }
        }
    }
}
