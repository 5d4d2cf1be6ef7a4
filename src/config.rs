use std::time::Duration;

/// Runtime configuration, loaded from the environment (`.env` is loaded first
/// so local development doesn't need exported shell variables).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub api_token: String,
    pub bind_addr: String,
    pub port: u16,
    /// Accepted for interface parity with deployments that plug in an
    /// external user model; this crate has one first-class `User` table.
    pub user_model_reference: String,
    pub show_docs: bool,
    pub api_title: String,
    pub pg_pool_size: u32,
    pub expire_sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let api_token = std::env::var("API_TOKEN")
            .map_err(|_| anyhow::anyhow!("API_TOKEN must be set"))?;

        Ok(Self {
            database_url,
            api_token,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            user_model_reference: std::env::var("USER_MODEL_REFERENCE")
                .unwrap_or_else(|_| "default".to_string()),
            show_docs: std::env::var("SHOW_DOCS")
                .ok()
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
            api_title: std::env::var("API_TITLE")
                .unwrap_or_else(|_| "Entitlement Ledger API".to_string()),
            pg_pool_size: std::env::var("PG_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            expire_sweep_interval_secs: std::env::var("EXPIRE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        })
    }

    pub fn expire_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expire_sweep_interval_secs)
    }
}
