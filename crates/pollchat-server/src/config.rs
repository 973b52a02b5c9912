use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Secrets that must never sign production tokens.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl: chrono::Duration,
    pub heartbeat_interval: Duration,
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys take their default;
    /// a value that fails to parse is an error naming the key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = match get("POLLCHAT_JWT_SECRET") {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            _ => {
                warn!("POLLCHAT_JWT_SECRET is unset or a placeholder; using a development secret");
                DEV_SECRET.to_string()
            }
        };

        let token_ttl_secs: i64 = parse_or(&get, "POLLCHAT_TOKEN_TTL_SECS", 3600)?;
        let heartbeat_secs: u64 = parse_or(&get, "POLLCHAT_HEARTBEAT_SECS", 15)?;
        let store_timeout_ms: u64 = parse_or(&get, "POLLCHAT_STORE_TIMEOUT_MS", 5000)?;
        anyhow::ensure!(token_ttl_secs > 0, "POLLCHAT_TOKEN_TTL_SECS must be positive");
        anyhow::ensure!(heartbeat_secs > 0, "POLLCHAT_HEARTBEAT_SECS must be positive");
        anyhow::ensure!(store_timeout_ms > 0, "POLLCHAT_STORE_TIMEOUT_MS must be positive");

        Ok(Self {
            jwt_secret,
            db_path: get("POLLCHAT_DB_PATH")
                .unwrap_or_else(|| "pollchat.db".into())
                .into(),
            host: get("POLLCHAT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "POLLCHAT_PORT", 5000)?,
            token_ttl: chrono::Duration::seconds(token_ttl_secs),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            store_timeout: Duration::from_millis(store_timeout_ms),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
    }
}
