use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub client_url: String,
    pub storage_timeout_ms: u64,
    pub min_pickup_lead_minutes: i64,
    pub default_radius_km: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 5000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            client_url: "http://localhost:5173".to_string(),
            storage_timeout_ms: 5_000,
            min_pickup_lead_minutes: 30,
            default_radius_km: 10.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or_default("LOG_FORMAT", defaults.log_format)?,
            client_url: env::var("CLIENT_URL").unwrap_or(defaults.client_url),
            storage_timeout_ms: parse_or_default("STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms)?,
            min_pickup_lead_minutes: parse_or_default(
                "MIN_PICKUP_LEAD_MINUTES",
                defaults.min_pickup_lead_minutes,
            )?,
            default_radius_km: parse_or_default("DEFAULT_RADIUS_KM", defaults.default_radius_km)?,
        };

        if !(config.default_radius_km.is_finite() && config.default_radius_km > 0.0) {
            return Err(AppError::Internal(
                "invalid DEFAULT_RADIUS_KM: must be a positive number".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn min_pickup_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.min_pickup_lead_minutes)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
