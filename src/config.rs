use anyhow::Context;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub unlock_hour: u32,
    pub geocoder_base_url: String,
    pub notify_webhook_url: Option<String>,
    pub rate_limit_backend_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL is not set in .env file")?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "debug".into());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
        let unlock_hour = env::var("UNLOCK_HOUR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);
        let geocoder_base_url = env::var("GEOCODER_BASE_URL")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".into());
        let notify_webhook_url = env::var("NOTIFY_WEBHOOK_URL").ok();
        let rate_limit_backend_url = env::var("RATE_LIMIT_BACKEND_URL").ok();

        Ok(Self {
            database_url,
            rust_log,
            bind_addr,
            unlock_hour,
            geocoder_base_url,
            notify_webhook_url,
            rate_limit_backend_url,
        })
    }
}
