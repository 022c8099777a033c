//! API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. No process-global state; the loaded config is cloned into
//! the shared application state.

use std::env;

use bindery_core::types::TaxRate;
use bindery_core::DEFAULT_TAX_RATE_BPS;

/// API service configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HTTP listen port.
    pub port: u16,

    /// Path to the SQLite database file.
    pub database_path: String,

    /// Sales tax applied at checkout, in basis points.
    pub tax_rate_bps: u32,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = ApiConfig {
            port: env::var("BINDERY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BINDERY_PORT".to_string()))?,

            database_path: env::var("BINDERY_DATABASE_PATH")
                .unwrap_or_else(|_| "bindery.db".to_string()),

            tax_rate_bps: env::var("BINDERY_TAX_RATE_BPS")
                .unwrap_or_else(|_| DEFAULT_TAX_RATE_BPS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BINDERY_TAX_RATE_BPS".to_string()))?,
        };

        // A rate above 100% is a configuration mistake, not a tax.
        if config.tax_rate_bps > 10_000 {
            return Err(ConfigError::InvalidValue(
                "BINDERY_TAX_RATE_BPS".to_string(),
            ));
        }

        Ok(config)
    }

    /// The configured tax rate.
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Only exercised when the variables are unset in the test
        // environment; load() falls back to the documented defaults.
        if env::var("BINDERY_PORT").is_err() && env::var("BINDERY_TAX_RATE_BPS").is_err() {
            let config = ApiConfig::load().unwrap();
            assert_eq!(config.port, 8080);
            assert_eq!(config.tax_rate_bps, DEFAULT_TAX_RATE_BPS);
            assert_eq!(config.tax_rate().bps(), DEFAULT_TAX_RATE_BPS);
        }
    }
}
