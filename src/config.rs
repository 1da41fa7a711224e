use std::env;
use std::time::Duration;

use crate::engine::relay::DEFAULT_LOCATION_MIN_INTERVAL;
use crate::error::AppError;
use crate::models::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentPolicy {
    Weighted,
    Nearest,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub order_queue_size: usize,
    pub channel_buffer_size: usize,
    pub assignment_delay: Duration,
    pub assignment_retry: Duration,
    pub location_min_interval: Duration,
    pub default_delivery_location: GeoPoint,
    pub delivery_eta_minutes: i64,
    pub assignment_policy: AssignmentPolicy,
    pub admin_token: Option<String>,
    pub chat_api_url: String,
    pub chat_api_key: Option<String>,
    pub chat_model: String,
    pub chat_timeout: Duration,
    pub static_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 5000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            order_queue_size: 1024,
            channel_buffer_size: 64,
            assignment_delay: Duration::from_millis(2000),
            assignment_retry: Duration::from_millis(1000),
            location_min_interval: DEFAULT_LOCATION_MIN_INTERVAL,
            default_delivery_location: GeoPoint {
                lat: 23.8103,
                lon: 90.4125,
            },
            delivery_eta_minutes: 35,
            assignment_policy: AssignmentPolicy::Weighted,
            admin_token: None,
            chat_api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            chat_api_key: None,
            chat_model: "llama-3.3-70b-versatile".to_string(),
            chat_timeout: Duration::from_millis(5000),
            static_dir: "static".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                Ok("compact") | Err(_) => LogFormat::Compact,
                Ok(other) => {
                    return Err(AppError::Internal(format!("invalid LOG_FORMAT: {other}")));
                }
            },
            order_queue_size: parse_or_default("ORDER_QUEUE_SIZE", defaults.order_queue_size)?,
            channel_buffer_size: parse_or_default(
                "CHANNEL_BUFFER_SIZE",
                defaults.channel_buffer_size,
            )?,
            assignment_delay: millis_or_default("ASSIGNMENT_DELAY_MS", defaults.assignment_delay)?,
            assignment_retry: millis_or_default("ASSIGNMENT_RETRY_MS", defaults.assignment_retry)?,
            location_min_interval: millis_or_default(
                "LOCATION_MIN_INTERVAL_MS",
                defaults.location_min_interval,
            )?,
            default_delivery_location: GeoPoint {
                lat: parse_or_default("DEFAULT_DELIVERY_LAT", defaults.default_delivery_location.lat)?,
                lon: parse_or_default("DEFAULT_DELIVERY_LON", defaults.default_delivery_location.lon)?,
            },
            delivery_eta_minutes: parse_or_default(
                "DELIVERY_ETA_MINUTES",
                defaults.delivery_eta_minutes,
            )?,
            assignment_policy: match env::var("ASSIGNMENT_POLICY").as_deref() {
                Ok("nearest") => AssignmentPolicy::Nearest,
                Ok("weighted") | Err(_) => AssignmentPolicy::Weighted,
                Ok(other) => {
                    return Err(AppError::Internal(format!(
                        "invalid ASSIGNMENT_POLICY: {other}, expected weighted/nearest"
                    )));
                }
            },
            admin_token: non_empty_var("ADMIN_TOKEN"),
            chat_api_url: env::var("CHAT_API_URL").unwrap_or(defaults.chat_api_url),
            chat_api_key: non_empty_var("CHAT_API_KEY").or_else(|| non_empty_var("GROQ_API_KEY")),
            chat_model: env::var("CHAT_MODEL").unwrap_or(defaults.chat_model),
            chat_timeout: millis_or_default("CHAT_TIMEOUT_MS", defaults.chat_timeout)?,
            static_dir: env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn millis_or_default(key: &str, default: Duration) -> Result<Duration, AppError> {
    let millis = parse_or_default(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
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
