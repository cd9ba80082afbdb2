use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub grpc_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub location_queue_size: usize,
    pub subscriber_buffer_size: usize,
    pub presence_grace: Duration,
    pub presence_sweep_interval: Duration,
    pub max_clock_skew: Duration,
    pub default_fee_minor: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            grpc_port: 50051,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            location_queue_size: 4096,
            subscriber_buffer_size: 64,
            presence_grace: Duration::from_secs(90),
            presence_sweep_interval: Duration::from_secs(15),
            max_clock_skew: Duration::from_secs(30),
            default_fee_minor: 1500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            grpc_port: parse_or_default("GRPC_PORT", defaults.grpc_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            location_queue_size: parse_or_default(
                "LOCATION_QUEUE_SIZE",
                defaults.location_queue_size,
            )?,
            subscriber_buffer_size: parse_or_default(
                "SUBSCRIBER_BUFFER_SIZE",
                defaults.subscriber_buffer_size,
            )?,
            presence_grace: Duration::from_secs(parse_or_default(
                "PRESENCE_GRACE_SECS",
                defaults.presence_grace.as_secs(),
            )?),
            presence_sweep_interval: Duration::from_secs(parse_or_default(
                "PRESENCE_SWEEP_SECS",
                defaults.presence_sweep_interval.as_secs(),
            )?),
            max_clock_skew: Duration::from_secs(parse_or_default(
                "MAX_CLOCK_SKEW_SECS",
                defaults.max_clock_skew.as_secs(),
            )?),
            default_fee_minor: parse_or_default("DEFAULT_FEE_MINOR", defaults.default_fee_minor)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.location_queue_size == 0 || self.subscriber_buffer_size == 0 {
            return Err(AppError::Internal(
                "queue and buffer sizes must be > 0".to_string(),
            ));
        }
        if self.presence_sweep_interval.is_zero() {
            return Err(AppError::Internal(
                "PRESENCE_SWEEP_SECS must be > 0".to_string(),
            ));
        }
        if self.default_fee_minor < 0 {
            return Err(AppError::Internal(
                "DEFAULT_FEE_MINOR must be >= 0".to_string(),
            ));
        }
        Ok(())
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
