use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} is required")]
    Missing { key: &'static str },

    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    pub access_token: String,
    pub api_url: String,
    pub webhook_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub max: u64,
    pub window: Duration,
    /// Reverse proxies in front of the server whose `X-Forwarded-For` hop is trusted.
    pub trusted_proxies: usize,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub backend_url: String,
    pub jwt_secret: String,
    pub mercado_pago: MercadoPagoConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
}

pub const LOCAL_FRONTEND: &str = "http://localhost:5173";

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("PORT", "4000")?,
            environment: try_load("APP_ENV", "development")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            frontend_url: trim_url(try_load("FRONTEND_URL", LOCAL_FRONTEND)?),
            backend_url: trim_url(try_load("BACKEND_URL", "http://localhost:4000")?),
            jwt_secret: read_secret("JWT_SECRET")?,
            mercado_pago: MercadoPagoConfig {
                access_token: read_secret("MP_ACCESS_TOKEN")?,
                api_url: try_load("MP_API_URL", payments::remote::API_URL)?,
                webhook_secret: read_secret("MP_WEBHOOK_SECRET").ok(),
            },
            mail: MailConfig {
                host: try_load("EMAIL_HOST", "smtp.gmail.com")?,
                port: try_load("EMAIL_PORT", "465")?,
                from: var("EMAIL_FROM").ok_or(ConfigError::Missing { key: "EMAIL_FROM" })?,
                password: read_secret("EMAIL_PASS")?,
            },
            rate_limit: RateLimitConfig {
                max: try_load("RATE_LIMIT_MAX", "20")?,
                window: Duration::from_secs(try_load("RATE_LIMIT_WINDOW_SECS", "900")?),
                trusted_proxies: try_load("TRUSTED_PROXIES", "0")?,
            },
        })
    }

    /// Origins allowed to call the API with credentials.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self.frontend_url.clone()];
        if self.frontend_url != LOCAL_FRONTEND {
            origins.push(LOCAL_FRONTEND.to_string());
        }

        origins
    }

    pub fn frontend(&self, path: &str) -> String {
        format!("{}{path}", self.frontend_url)
    }

    pub fn backend(&self, path: &str) -> String {
        format!("{}{path}", self.backend_url)
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        })
}

/// Reads a secret from the environment, falling back to a Docker secret file.
fn read_secret(secret_name: &'static str) -> Result<String, ConfigError> {
    if let Some(value) = var(secret_name) {
        return Ok(value.trim().to_string());
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            warn!("{secret_name} not found in the environment or {path}");
            ConfigError::Missing { key: secret_name }
        })
}
