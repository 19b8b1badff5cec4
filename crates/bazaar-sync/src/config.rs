//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BAZAAR_SYNC_INTERVAL_SECS=30                                       │
//! │     BAZAAR_UZUM_SECRET_KEY=...                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/bazaar-sync/sync.toml (Linux)                            │
//! │     ~/Library/Application Support/com.bazaar.bazaar-sync/sync.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     60 s interval, 10 outbound messages per cycle, 30 day lookback     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [sync]
//! interval_secs = 60
//! outbound_batch_size = 10
//! order_lookback_days = 30
//!
//! [database]
//! path = "/var/lib/bazaar/bazaar.db"
//!
//! [notify]
//! bot_token = "123456:ABC"
//! user_ids = [111111, 222222]
//!
//! [platforms.yandex]
//! base_url = "https://api.partner.market.yandex.ru"
//! seller_id = "seller-1"
//! secret_key = "..."
//! campaign_id = "21000000"
//!
//! [platforms.uzum]
//! base_url = "https://api-seller.uzum.uz/api/seller-openapi"
//! seller_id = "shop-7"
//! secret_key = "..."
//! interval_secs = 120
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use bazaar_core::{
    Platform, DEFAULT_ORDER_LOOKBACK_DAYS, DEFAULT_OUTBOUND_BATCH_SIZE, DEFAULT_SYNC_INTERVAL_SECS,
};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Settings
// =============================================================================

/// Global sync behavior. Interval and batch size can be overridden per
/// platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Seconds between the starts of two cycles of one platform.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Pending replies relayed per platform per cycle.
    #[serde(default = "default_batch_size")]
    pub outbound_batch_size: usize,

    /// How far back order pulls reach.
    #[serde(default = "default_lookback")]
    pub order_lookback_days: i64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for every store call.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    /// Assumed token lifetime when a platform does not report one.
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: u64,
}

fn default_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}
fn default_batch_size() -> usize {
    DEFAULT_OUTBOUND_BATCH_SIZE
}
fn default_lookback() -> i64 {
    DEFAULT_ORDER_LOOKBACK_DAYS
}
fn default_request_timeout() -> u64 {
    30
}
fn default_store_timeout() -> u64 {
    10
}
fn default_token_lifetime() -> u64 {
    1800
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            outbound_batch_size: default_batch_size(),
            order_lookback_days: default_lookback(),
            request_timeout_secs: default_request_timeout(),
            store_timeout_secs: default_store_timeout(),
            token_lifetime_secs: default_token_lifetime(),
        }
    }
}

impl SyncSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.token_lifetime_secs)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "bazaar", "bazaar-sync")
        .map(|dirs| dirs.data_dir().join("bazaar.db"))
        .unwrap_or_else(|| PathBuf::from("bazaar.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
        }
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

/// Telegram bot used for new-order and new-message alerts.
#[derive(Clone, Serialize, Deserialize)]
pub struct NotifySettings {
    /// Bot token; alerts are disabled when absent.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Chat ids that receive every alert.
    #[serde(default)]
    pub user_ids: Vec<i64>,

    #[serde(default = "default_bot_api_url")]
    pub api_url: String,
}

fn default_bot_api_url() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotifySettings {
    fn default() -> Self {
        NotifySettings {
            bot_token: None,
            user_ids: Vec::new(),
            api_url: default_bot_api_url(),
        }
    }
}

impl NotifySettings {
    /// Alerts go out only with a token and at least one recipient.
    pub fn is_enabled(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty()) && !self.user_ids.is_empty()
    }
}

impl fmt::Debug for NotifySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifySettings")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("user_ids", &self.user_ids)
            .field("api_url", &self.api_url)
            .finish()
    }
}

// =============================================================================
// Platform Configuration
// =============================================================================

/// Credentials and overrides for one marketplace.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Set to false to keep the section but not run the platform.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub seller_id: String,

    #[serde(default)]
    pub secret_key: String,

    /// Yandex campaign the seller account operates.
    #[serde(default)]
    pub campaign_id: Option<String>,

    #[serde(default)]
    pub interval_secs: Option<u64>,

    #[serde(default)]
    pub outbound_batch_size: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("seller_id", &self.seller_id)
            .field("secret_key", &"<redacted>")
            .field("campaign_id", &self.campaign_id)
            .field("interval_secs", &self.interval_secs)
            .field("outbound_batch_size", &self.outbound_batch_size)
            .finish()
    }
}

impl PlatformConfig {
    /// Checks that the platform can be started.
    pub fn validate(&self, platform: Platform) -> SyncResult<()> {
        let missing = |field: &str| SyncError::MissingCredential {
            platform,
            field: field.to_string(),
        };

        if self.base_url.trim().is_empty() {
            return Err(missing("base_url"));
        }
        let url = url::Url::parse(&self.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "{} base_url must be http(s), got: {}",
                platform, self.base_url
            )));
        }

        if self.seller_id.trim().is_empty() {
            return Err(missing("seller_id"));
        }
        if self.secret_key.is_empty() {
            return Err(missing("secret_key"));
        }
        if platform == Platform::Yandex
            && self.campaign_id.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(missing("campaign_id"));
        }

        if self.interval_secs == Some(0) {
            return Err(SyncError::InvalidConfig(format!(
                "{} interval_secs must be greater than 0",
                platform
            )));
        }
        if self.outbound_batch_size == Some(0) {
            return Err(SyncError::InvalidConfig(format!(
                "{} outbound_batch_size must be greater than 0",
                platform
            )));
        }
        Ok(())
    }
}

/// One optional section per marketplace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub yandex: Option<PlatformConfig>,
    #[serde(default)]
    pub uzum: Option<PlatformConfig>,
    #[serde(default)]
    pub kaspi: Option<PlatformConfig>,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::Yandex => self.yandex.as_ref(),
            Platform::Uzum => self.uzum.as_ref(),
            Platform::Kaspi => self.kaspi.as_ref(),
        }
    }

    /// Returns the section, creating an empty one if needed.
    pub fn entry(&mut self, platform: Platform) -> &mut PlatformConfig {
        let slot = match platform {
            Platform::Yandex => &mut self.yandex,
            Platform::Uzum => &mut self.uzum,
            Platform::Kaspi => &mut self.kaspi,
        };
        slot.get_or_insert_with(|| PlatformConfig {
            enabled: true,
            ..PlatformConfig::default()
        })
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub notify: NotifySettings,

    #[serde(default)]
    pub platforms: PlatformsConfig,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    ///
    /// Platform credentials are not checked here; see
    /// [`runnable_platforms`](Self::runnable_platforms).
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the global settings.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }
        if self.sync.outbound_batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "outbound_batch_size must be greater than 0".into(),
            ));
        }
        if self.sync.order_lookback_days <= 0 {
            return Err(SyncError::InvalidConfig(
                "order_lookback_days must be positive".into(),
            ));
        }
        if self.sync.request_timeout_secs == 0 || self.sync.store_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeouts must be greater than 0".into(),
            ));
        }
        if !self.notify.user_ids.is_empty() && self.notify.bot_token.is_none() {
            warn!("notify.user_ids set without a bot_token; alerts are disabled");
        }
        Ok(())
    }

    /// Enabled platforms whose credentials validate.
    ///
    /// A platform with a bad section is logged and left out; the rest still
    /// run.
    pub fn runnable_platforms(&self) -> Vec<(Platform, PlatformConfig)> {
        Platform::ALL
            .iter()
            .filter_map(|&platform| {
                let section = self.platforms.get(platform)?;
                if !section.enabled {
                    debug!(%platform, "Platform disabled in config");
                    return None;
                }
                match section.validate(platform) {
                    Ok(()) => Some((platform, section.clone())),
                    Err(e) => {
                        error!(%platform, error = %e, "Platform not started");
                        None
                    }
                }
            })
            .collect()
    }

    /// Interval for one platform, honoring its override.
    pub fn interval_for(&self, platform: Platform) -> Duration {
        let secs = self
            .platforms
            .get(platform)
            .and_then(|p| p.interval_secs)
            .unwrap_or(self.sync.interval_secs);
        Duration::from_secs(secs)
    }

    /// Outbound batch size for one platform, honoring its override.
    pub fn batch_size_for(&self, platform: Platform) -> usize {
        self.platforms
            .get(platform)
            .and_then(|p| p.outbound_batch_size)
            .unwrap_or(self.sync.outbound_batch_size)
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(secs) = env_parse::<u64>("BAZAAR_SYNC_INTERVAL_SECS") {
            debug!(interval_secs = secs, "Overriding sync interval from environment");
            self.sync.interval_secs = secs;
        }
        if let Some(size) = env_parse::<usize>("BAZAAR_OUTBOUND_BATCH_SIZE") {
            self.sync.outbound_batch_size = size;
        }
        if let Some(days) = env_parse::<i64>("BAZAAR_ORDER_LOOKBACK_DAYS") {
            self.sync.order_lookback_days = days;
        }
        if let Ok(path) = std::env::var("BAZAAR_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(token) = std::env::var("BAZAAR_BOT_TOKEN") {
            self.notify.bot_token = Some(token);
        }
        if let Ok(ids) = std::env::var("BAZAAR_NOTIFY_USER_IDS") {
            let parsed: Result<Vec<i64>, _> = ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(list) => self.notify.user_ids = list,
                Err(_) => warn!(value = %ids, "Ignoring malformed BAZAAR_NOTIFY_USER_IDS"),
            }
        }

        for platform in Platform::ALL {
            let var = |field: &str| std::env::var(format!("BAZAAR_{}_{}", platform.env_prefix(), field));
            let overrides = [
                ("BASE_URL", var("BASE_URL")),
                ("SELLER_ID", var("SELLER_ID")),
                ("SECRET_KEY", var("SECRET_KEY")),
                ("CAMPAIGN_ID", var("CAMPAIGN_ID")),
            ];
            for (field, value) in overrides {
                let Ok(value) = value else { continue };
                debug!(%platform, field, "Overriding platform setting from environment");
                let section = self.platforms.entry(platform);
                match field {
                    "BASE_URL" => section.base_url = value,
                    "SELLER_ID" => section.seller_id = value,
                    "SECRET_KEY" => section.secret_key = value,
                    _ => section.campaign_id = Some(value),
                }
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bazaar", "bazaar-sync")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uzum() -> PlatformConfig {
        PlatformConfig {
            enabled: true,
            base_url: "https://uzum.test/api".into(),
            seller_id: "shop-7".into(),
            secret_key: "s3cr3t".into(),
            ..PlatformConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.interval_secs, 60);
        assert_eq!(config.sync.outbound_batch_size, 10);
        assert_eq!(config.sync.order_lookback_days, 30);
        assert_eq!(config.sync.token_lifetime_secs, 1800);
        assert!(config.validate().is_ok());
        assert!(config.runnable_platforms().is_empty());
    }

    #[test]
    fn test_toml_parsing() {
        let config: SyncConfig = toml::from_str(
            r#"
            [sync]
            interval_secs = 45

            [notify]
            bot_token = "123:abc"
            user_ids = [1, 2]

            [platforms.uzum]
            base_url = "https://uzum.test/api"
            seller_id = "shop-7"
            secret_key = "s3cr3t"
            outbound_batch_size = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.interval_secs, 45);
        assert_eq!(config.sync.outbound_batch_size, 10);
        assert!(config.notify.is_enabled());
        assert_eq!(config.batch_size_for(Platform::Uzum), 3);
        assert_eq!(config.batch_size_for(Platform::Kaspi), 10);
        assert_eq!(config.interval_for(Platform::Uzum), Duration::from_secs(45));

        let runnable = config.runnable_platforms();
        assert_eq!(runnable.len(), 1);
        assert_eq!(runnable[0].0, Platform::Uzum);
    }

    #[test]
    fn test_platform_validation() {
        assert!(uzum().validate(Platform::Uzum).is_ok());

        let mut bad = uzum();
        bad.secret_key.clear();
        assert!(matches!(
            bad.validate(Platform::Uzum),
            Err(SyncError::MissingCredential { .. })
        ));

        let mut ftp = uzum();
        ftp.base_url = "ftp://uzum.test".into();
        assert!(ftp.validate(Platform::Uzum).unwrap_err().is_config_error());

        // Yandex additionally needs the campaign
        assert!(uzum().validate(Platform::Yandex).is_err());
        let mut yandex = uzum();
        yandex.campaign_id = Some("21000000".into());
        assert!(yandex.validate(Platform::Yandex).is_ok());
    }

    #[test]
    fn test_invalid_platform_is_skipped_others_run() {
        let mut config = SyncConfig::default();
        config.platforms.uzum = Some(uzum());
        config.platforms.kaspi = Some(PlatformConfig {
            enabled: true,
            base_url: "https://kaspi.test".into(),
            ..PlatformConfig::default()
        });
        let mut disabled = uzum();
        disabled.enabled = false;
        config.platforms.yandex = Some(disabled);

        let runnable: Vec<Platform> = config.runnable_platforms().into_iter().map(|(p, _)| p).collect();
        assert_eq!(runnable, vec![Platform::Uzum]);
    }

    #[test]
    fn test_secrets_are_redacted() {
        let mut config = SyncConfig::default();
        config.platforms.uzum = Some(uzum());
        config.notify.bot_token = Some("123:abc".into());

        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cr3t"));
        assert!(!printed.contains("123:abc"));
        assert!(printed.contains("shop-7"));
    }

    #[test]
    fn test_global_validation() {
        let mut config = SyncConfig::default();
        config.sync.outbound_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.sync.order_lookback_days = 0;
        assert!(config.validate().is_err());
    }
}
