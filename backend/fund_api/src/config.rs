//! Application configuration loaded from environment variables.

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Service title reported by `/health`
    pub app_title: String,
    /// SQLite database URL (e.g. `sqlite:./fund.db`)
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How many times a create is attempted when the ledger changed under it
    pub allocation_max_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let allocation_max_retries: u32 = env_var("ALLOCATION_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ServiceError::Config("Invalid ALLOCATION_MAX_RETRIES".to_string()))?;
        if allocation_max_retries == 0 {
            return Err(ServiceError::Config(
                "ALLOCATION_MAX_RETRIES must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            app_title: env_var("APP_TITLE").unwrap_or_else(|_| "Cat charity fund".to_string()),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./fund.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ServiceError::Config("Invalid API_PORT".to_string()))?,
            allocation_max_retries,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| ServiceError::Config(format!("Missing env var: {key}")))
}
