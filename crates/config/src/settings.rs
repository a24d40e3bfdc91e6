// Application settings
// Loaded from $REVLEDGER_CONFIG or ~/.config/revledger/settings.toml

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Env var that overrides the settings file location.
pub const CONFIG_ENV: &str = "REVLEDGER_CONFIG";

/// Hard ceiling the reporting API places on token lifetime.
pub const MAX_TOKEN_TTL_SECS: u64 = 20 * 60;

/// Which report column attributes a row to a calendar day.
///
/// Monthly reports carry the whole month in one row, so `begin_date` puts
/// it on the first of the month and `end_date` on the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateColumn {
    #[default]
    BeginDate,
    EndDate,
}

impl DateColumn {
    /// Header name in the sales report.
    pub fn header(&self) -> &'static str {
        match self {
            DateColumn::BeginDate => "Begin Date",
            DateColumn::EndDate => "End Date",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file. None = `<data_dir>/revledger/ledger.sqlite3`.
    pub path: Option<PathBuf>,
}

impl StoreSettings {
    pub fn effective_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => p.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("revledger")
                .join("ledger.sqlite3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppStoreSettings {
    pub api_base: String,
    /// `filter[version]` sent with every report request.
    pub report_version: String,
    pub date_column: DateColumn,
    pub proceeds_column: String,
    /// Days between today and the newest published daily report.
    pub report_lag_days: u32,
    pub token_ttl_secs: u64,
}

impl Default for AppStoreSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.appstoreconnect.apple.com".to_string(),
            report_version: "1_0".to_string(),
            date_column: DateColumn::BeginDate,
            proceeds_column: "Developer Proceeds".to_string(),
            report_lag_days: 2,
            token_ttl_secs: MAX_TOKEN_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeSettings {
    pub api_base: String,
    /// First day of the Stripe series in the combined feed.
    pub revenue_start: NaiveDate,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            revenue_start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub cache_ttl_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub app_store: AppStoreSettings,
    pub stripe: StripeSettings,
    pub http: HttpSettings,
    pub feed: FeedSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        if let Some(p) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(p);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("revledger")
            .join("settings.toml")
    }

    /// Load settings from `path`. A missing file yields defaults; a
    /// malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.app_store.token_ttl_secs;
        if ttl == 0 || ttl > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::Validation(format!(
                "app_store.token_ttl_secs must be between 1 and {MAX_TOKEN_TTL_SECS}, got {ttl}"
            )));
        }
        if self.app_store.proceeds_column.trim().is_empty() {
            return Err(ConfigError::Validation(
                "app_store.proceeds_column must not be empty".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "http.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
