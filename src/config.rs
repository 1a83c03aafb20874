use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Flat delivery surcharge in minor currency units; 0 disables it.
    pub delivery_fee: i64,
    pub upload_dir: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            host: env_or("APP_HOST", "127.0.0.1"),
            port: parsed_env_or("APP_PORT", 3000),
            delivery_fee: parsed_env_or("DELIVERY_FEE", 0),
            upload_dir: env_or("UPLOAD_DIR", "uploads"),
        })
    }
}
