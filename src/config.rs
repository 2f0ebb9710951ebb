//! Configuration loader and validator for the Shopee bridge.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub sync: Sync,
    pub shopee: Shopee,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub data_dir: String,
}

/// Sync tunables. The page sizes and the order-window cap are observed
/// partner-API limits, not documented contracts, so they stay configurable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sync {
    pub product_page_size: i64,
    pub order_page_size: i64,
    /// Delay between paginated list calls, a self-imposed rate limit.
    pub page_delay_ms: u64,
    /// Delay between per-status order list calls during an ALL scan.
    pub status_scan_delay_ms: u64,
    /// Maximum width of a single order list window, in days.
    pub order_window_days: i64,
    /// Default lookback when an order sync names no range.
    pub default_order_days: i64,
    /// Period of the opportunistic token-refresh timer.
    pub token_refresh_interval_secs: u64,
}

/// Partner API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shopee {
    pub partner_id: String,
    pub partner_key: String,
    pub redirect_url: String,
    pub api_base: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `SHOPSYNC_PARTNER_KEY` overrides the stored partner key so the secret
///   can stay out of the file.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(key) = std::env::var("SHOPSYNC_PARTNER_KEY") {
        if !key.trim().is_empty() {
            cfg.shopee.partner_key = key;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance. A missing partner credential is a
/// configuration error raised before any remote call is ever signed.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.shopee.partner_id.trim().is_empty() {
        return Err(ConfigError::Invalid("shopee.partner_id must be non-empty"));
    }
    if cfg.shopee.partner_id.parse::<i64>().is_err() {
        return Err(ConfigError::Invalid("shopee.partner_id must be numeric"));
    }
    if cfg.shopee.partner_key.trim().is_empty() {
        return Err(ConfigError::Invalid("shopee.partner_key must be non-empty"));
    }
    if cfg.shopee.redirect_url.trim().is_empty() {
        return Err(ConfigError::Invalid("shopee.redirect_url must be non-empty"));
    }
    if cfg.shopee.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("shopee.api_base must be non-empty"));
    }

    if cfg.sync.product_page_size <= 0 || cfg.sync.product_page_size > 100 {
        return Err(ConfigError::Invalid(
            "sync.product_page_size must be in 1..=100",
        ));
    }
    if cfg.sync.order_page_size <= 0 || cfg.sync.order_page_size > 100 {
        return Err(ConfigError::Invalid(
            "sync.order_page_size must be in 1..=100",
        ));
    }
    if cfg.sync.order_window_days <= 0 || cfg.sync.order_window_days > 15 {
        return Err(ConfigError::Invalid(
            "sync.order_window_days must be in 1..=15",
        ));
    }
    if cfg.sync.default_order_days <= 0 {
        return Err(ConfigError::Invalid("sync.default_order_days must be > 0"));
    }
    if cfg.sync.token_refresh_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "sync.token_refresh_interval_secs must be > 0",
        ));
    }

    Ok(())
}

/// Example YAML matching the shipped defaults.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "0.0.0.0:3000"
  data_dir: "./data"

sync:
  product_page_size: 50
  order_page_size: 100
  page_delay_ms: 1000
  status_scan_delay_ms: 200
  order_window_days: 15
  default_order_days: 90
  token_refresh_interval_secs: 10800

shopee:
  partner_id: "2012740"
  partner_key: "YOUR_SHOPEE_PARTNER_KEY"
  redirect_url: "https://example.com/oauth/callback"
  api_base: "https://partner.shopeemobile.com"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_partner_id() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopee.partner_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("partner_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopee.partner_id = "not-a-number".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_partner_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.shopee.partner_key = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("partner_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn window_cap_is_bounded() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.order_window_days = 30;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.order_window_days = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn page_sizes_are_bounded() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.product_page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sync.order_page_size = 500;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.sync.product_page_size, 50);
        assert_eq!(cfg.sync.order_window_days, 15);
    }
}
