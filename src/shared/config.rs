use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::shared::errors::AppError;
use crate::shared::types::AppConfig;

/// Environment variable overriding `network.rpc_url`
pub const ENV_RPC_URL: &str = "HOPWATCH_RPC_URL";
/// Environment variable overriding `store.database_url`
pub const ENV_DATABASE_URL: &str = "HOPWATCH_DATABASE_URL";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file, then apply `.env` / environment overrides.
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig, AppError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;
            Self::parse(&content)?
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            AppConfig::default()
        };

        if dotenvy::dotenv().is_ok() {
            info!("loaded .env");
        }
        Self::apply_env(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<AppConfig, AppError> {
        toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.is_empty()) {
            config.network.rpc_url = url;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            config.store.database_url = url;
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let slippage = self.trading.slippage;
        if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(AppError::ConfigError(format!(
                "trading.slippage must be in (0, 1), got {}",
                slippage
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(AppError::ConfigError("retry.max_attempts must be at least 1".to_string()));
        }
        if self.poller.native.max_attempts == 0 || self.poller.token.max_attempts == 0 {
            return Err(AppError::ConfigError("poller max_attempts must be at least 1".to_string()));
        }
        if self.scheduler.interval_ms == 0 {
            return Err(AppError::ConfigError("scheduler.interval_ms must be positive".to_string()));
        }
        if self.scheduler.max_concurrency == 0 || self.scheduler.queue_capacity == 0 {
            return Err(AppError::ConfigError(
                "scheduler.max_concurrency and queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
