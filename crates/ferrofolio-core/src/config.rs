//! Runtime settings.
//!
//! Resolution order: built-in defaults, then `$FERROFOLIO_HOME/config.json`
//! when it exists, then `FERROFOLIO_HOME`, `FERROFOLIO_DB_PATH` and
//! `FERROFOLIO_STALENESS_SECS` from the environment.

use std::path::{Path, PathBuf};

use ferrofolio_warehouse::WarehouseConfig;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::domain::{SymbolNormalizer, DEFAULT_MAX_SYMBOL_LEN};
use crate::error::CoreError;
use crate::sync::DEFAULT_DOWNLOAD_WORKERS;
use crate::throttling::Throttle;
use crate::universe::DEFAULT_SP500_CSV_URL;
use crate::ValidationError;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    /// Cash a newly created portfolio starts with.
    pub starting_cash: f64,
    pub max_symbol_len: usize,
    /// Age after which stored prices are refreshed on read.
    pub staleness_threshold_secs: i64,
    pub universe_url: String,
    pub download_workers: usize,
    pub requests_per_minute: u32,
    pub http_timeout_ms: u64,
}

impl Default for FolioConfig {
    fn default() -> Self {
        let warehouse = WarehouseConfig::default();
        Self {
            home: warehouse.ferrofolio_home,
            db_path: warehouse.db_path,
            starting_cash: 100_000.0,
            max_symbol_len: DEFAULT_MAX_SYMBOL_LEN,
            staleness_threshold_secs: 86_400,
            universe_url: DEFAULT_SP500_CSV_URL.to_string(),
            download_workers: DEFAULT_DOWNLOAD_WORKERS,
            requests_per_minute: 120,
            http_timeout_ms: 10_000,
        }
    }
}

impl FolioConfig {
    pub fn load() -> Result<Self, CoreError> {
        let defaults = Self::default();
        let path = defaults.home.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            log::debug!("reading configuration from {}", path.display());
            Self::from_path(&path)?
        } else {
            defaults
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Settings from a JSON file; absent fields keep their defaults.
    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply environment-style overrides read through `lookup`.
    ///
    /// A new home moves the database with it unless the database path was
    /// set somewhere else explicitly.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ValidationError> {
        if let Some(home) = lookup("FERROFOLIO_HOME").filter(|value| !value.trim().is_empty()) {
            let home = PathBuf::from(home);
            if self.db_path == default_db_path(&self.home) {
                self.db_path = default_db_path(&home);
            }
            self.home = home;
        }

        if let Some(db_path) = lookup("FERROFOLIO_DB_PATH").filter(|value| !value.trim().is_empty())
        {
            self.db_path = PathBuf::from(db_path);
        }

        if let Some(raw) = lookup("FERROFOLIO_STALENESS_SECS") {
            self.staleness_threshold_secs =
                raw.trim().parse().map_err(|_| ValidationError::InvalidConfig {
                    field: "staleness_threshold_secs",
                    reason: format!("'{raw}' is not a whole number of seconds"),
                })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.starting_cash.is_finite() || self.starting_cash < 0.0 {
            return Err(invalid("starting_cash", "must be a non-negative amount"));
        }
        if self.max_symbol_len == 0 {
            return Err(invalid("max_symbol_len", "must be at least 1"));
        }
        if self.staleness_threshold_secs < 0 {
            return Err(invalid("staleness_threshold_secs", "must not be negative"));
        }
        if self.universe_url.trim().is_empty() {
            return Err(invalid("universe_url", "must not be empty"));
        }
        if self.download_workers == 0 {
            return Err(invalid("download_workers", "must be at least 1"));
        }
        if self.requests_per_minute == 0 {
            return Err(invalid("requests_per_minute", "must be at least 1"));
        }
        if self.http_timeout_ms == 0 {
            return Err(invalid("http_timeout_ms", "must be at least 1"));
        }
        Ok(())
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig {
            ferrofolio_home: self.home.clone(),
            db_path: self.db_path.clone(),
            ..WarehouseConfig::default()
        }
    }

    pub fn staleness(&self) -> Duration {
        Duration::seconds(self.staleness_threshold_secs)
    }

    pub fn normalizer(&self) -> SymbolNormalizer {
        SymbolNormalizer::new(self.max_symbol_len)
    }

    pub fn throttle(&self) -> Throttle {
        Throttle::per_minute(self.requests_per_minute)
    }
}

fn default_db_path(home: &Path) -> PathBuf {
    home.join("data").join("ferrofolio.duckdb")
}

fn invalid(field: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}
