use crate::database::models::Currency;
use crate::ledger::{LedgerOptions, PostClosurePolicy};
use crate::retry::RetryConfig;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub user_id: Option<String>,
    pub default_currency: Currency,
    pub max_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub post_closure_policy: PostClosurePolicy,
    pub evolution_window: usize,
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "budget_cycle.db".to_string());

        let user_id = env::var("BUDGET_USER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let default_currency = env::var("DEFAULT_CURRENCY")
            .unwrap_or_else(|_| "EUR".to_string())
            .parse::<Currency>()
            .map_err(|e| anyhow!("DEFAULT_CURRENCY: {e}"))?;

        let max_retry_attempts = env::var("MAX_RETRY_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()
            .unwrap_or(3);

        let retry_base_delay_ms = env::var("RETRY_BASE_DELAY_MS")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<u64>()
            .unwrap_or(100);

        let post_closure_policy = env::var("POST_CLOSURE_EDITS")
            .unwrap_or_else(|_| "forbid".to_string())
            .parse::<PostClosurePolicy>()
            .map_err(|e| anyhow!("POST_CLOSURE_EDITS: {e}"))?;

        let evolution_window = env::var("EVOLUTION_WINDOW")
            .unwrap_or_else(|_| "6".to_string())
            .parse::<usize>()
            .unwrap_or(6);

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Ok(Settings {
            database_url,
            user_id,
            default_currency,
            max_retry_attempts,
            retry_base_delay_ms,
            post_closure_policy,
            evolution_window,
            log_level,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow!("Max retry attempts must be greater than 0"));
        }

        if self.evolution_window == 0 {
            return Err(anyhow!("Evolution window must be greater than 0"));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryConfig::default()
        }
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            post_closure: self.post_closure_policy,
            retry: self.retry_config(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "budget_cycle.db".to_string(),
            user_id: None,
            default_currency: Currency::Eur,
            max_retry_attempts: 3,
            retry_base_delay_ms: 100,
            post_closure_policy: PostClosurePolicy::Forbid,
            evolution_window: 6,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 7] = [
        "DATABASE_URL",
        "BUDGET_USER_ID",
        "DEFAULT_CURRENCY",
        "MAX_RETRY_ATTEMPTS",
        "RETRY_BASE_DELAY_MS",
        "POST_CLOSURE_EDITS",
        "EVOLUTION_WINDOW",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();
        let settings = Settings::new().unwrap();
        assert_eq!(settings.database_url, "budget_cycle.db");
        assert_eq!(settings.user_id, None);
        assert_eq!(settings.default_currency, Currency::Eur);
        assert_eq!(settings.post_closure_policy, PostClosurePolicy::Forbid);
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_overrides_from_env() {
        clear_env();
        env::set_var("DATABASE_URL", ":memory:");
        env::set_var("BUDGET_USER_ID", "user-42");
        env::set_var("DEFAULT_CURRENCY", "mad");
        env::set_var("POST_CLOSURE_EDITS", "allow");
        env::set_var("MAX_RETRY_ATTEMPTS", "5");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.database_url, ":memory:");
        assert_eq!(settings.user_id.as_deref(), Some("user-42"));
        assert_eq!(settings.default_currency, Currency::Mad);
        assert_eq!(settings.post_closure_policy, PostClosurePolicy::Allow);
        assert_eq!(settings.ledger_options().retry.max_attempts, 5);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_currency_is_rejected() {
        clear_env();
        env::set_var("DEFAULT_CURRENCY", "GBP");
        assert!(Settings::new().is_err());
        clear_env();
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let settings = Settings {
            evolution_window: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
