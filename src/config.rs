use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub functions: FunctionsConfig,
    pub storage: StorageConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_url: String,
    /// Without a key checkout runs in mock mode and redirects straight back.
    pub api_key: Option<String>,
    pub webhook_secret: String,
    pub currency: String,
    pub mock_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionsConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
    pub bucket: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub site_url: String,
    pub session_ttl_hours: i64,
    pub cancel_reload_delay_ms: u64,
    pub session_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let site_url = env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory://".to_string()),

            gateway: GatewayConfig {
                api_url: env::var("PAYMENT_API_URL")
                    .unwrap_or_else(|_| "http://localhost:9090".to_string()),
                api_key: env::var("PAYMENT_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")?,
                currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
                mock_delay_ms: parse_or("MOCK_CHECKOUT_DELAY_MS", 1500),
            },

            functions: FunctionsConfig {
                base_url: env::var("FUNCTIONS_URL").ok().filter(|u| !u.trim().is_empty()),
                api_key: env::var("FUNCTIONS_KEY").ok(),
            },

            storage: StorageConfig {
                root: env::var("STORAGE_ROOT").unwrap_or_else(|_| "./uploads".to_string()),
                bucket: "user-uploads".to_string(),
                public_url: env::var("PUBLIC_STORAGE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            },

            app: AppConfig {
                site_url,
                session_ttl_hours: parse_or("SESSION_TTL_HOURS", 24 * 7),
                cancel_reload_delay_ms: parse_or("CANCEL_RELOAD_DELAY_MS", 2000),
                session_sweep_secs: parse_or("SESSION_SWEEP_SECS", 300),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:9090".to_string(),
            api_key: None,
            webhook_secret: "test_webhook_secret".to_string(),
            currency: "USD".to_string(),
            mock_delay_ms: 0,
        }
    }
}

impl Default for FunctionsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:3000".to_string(),
            session_ttl_hours: 24 * 7,
            cancel_reload_delay_ms: 2000,
            session_sweep_secs: 300,
        }
    }
}
