//! Application configuration loaded from environment variables.

use crate::errors::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet address that receives all contributions (payment pointer or URL)
    pub receiving_wallet_address: String,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Externally reachable base URL of this service; the consent finish
    /// redirect is built on top of it
    pub public_base_url: String,
    /// Where the payer's browser is sent once a contribution is recorded
    pub success_redirect_url: String,
    /// How long (in seconds) an in-flight grant attempt is kept before it
    /// counts as abandoned
    pub pending_ttl_secs: u64,
    /// How often (in seconds) abandoned grant attempts are swept out
    pub pending_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            receiving_wallet_address: env_var("RECEIVING_WALLET_ADDRESS").map_err(|_| {
                OrchestratorError::Config(
                    "RECEIVING_WALLET_ADDRESS environment variable is required".to_string(),
                )
            })?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./contributions.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| OrchestratorError::Config("Invalid API_PORT".to_string()))?,
            public_base_url: env_var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            success_redirect_url: env_var("SUCCESS_REDIRECT_URL")
                .unwrap_or_else(|_| "http://localhost:3000/thankyou".to_string()),
            pending_ttl_secs: env_var("PENDING_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .map_err(|_| OrchestratorError::Config("Invalid PENDING_TTL_SECS".to_string()))?,
            pending_sweep_secs: env_var("PENDING_SWEEP_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| OrchestratorError::Config("Invalid PENDING_SWEEP_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| OrchestratorError::Config(format!("Missing env var: {key}")))
}
