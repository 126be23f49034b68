use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::limiter::RateLimitConfig;

/// 配置错误，启动阶段直接失败
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// 未设置时使用内存存储
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub global_rate_limit: RateLimitConfig,
    pub api_rate_limit: RateLimitConfig,
    pub chat_rate_limit: RateLimitConfig,
    pub notices_rate_limit: RateLimitConfig,
    pub message_rate_limit: RateLimitConfig,
    pub maintenance_interval_secs: u64,
    pub bucket_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt_secret: String::new(),
            server_host: "::".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            global_rate_limit: RateLimitConfig::global(),
            api_rate_limit: RateLimitConfig::api(),
            chat_rate_limit: RateLimitConfig::chat(),
            notices_rate_limit: RateLimitConfig::notices(),
            message_rate_limit: RateLimitConfig::message_tier(),
            maintenance_interval_secs: 300,
            bucket_idle_secs: 300,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret,
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or("SERVER_PORT", defaults.server_port)?,
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            global_rate_limit: rate_limit_from_env(
                "GLOBAL_RATE_LIMIT_REQUESTS",
                "GLOBAL_RATE_LIMIT_WINDOW_MS",
                &defaults.global_rate_limit,
            )?,
            api_rate_limit: rate_limit_from_env(
                "API_RATE_LIMIT_REQUESTS",
                "API_RATE_LIMIT_WINDOW_MS",
                &defaults.api_rate_limit,
            )?,
            chat_rate_limit: rate_limit_from_env(
                "CHAT_RATE_LIMIT_MESSAGES",
                "CHAT_RATE_LIMIT_WINDOW_MS",
                &defaults.chat_rate_limit,
            )?,
            notices_rate_limit: rate_limit_from_env(
                "NOTICES_RATE_LIMIT_REQUESTS",
                "NOTICES_RATE_LIMIT_WINDOW_MS",
                &defaults.notices_rate_limit,
            )?,
            message_rate_limit: rate_limit_from_env(
                "MESSAGE_RATE_LIMIT_REQUESTS",
                "MESSAGE_RATE_LIMIT_WINDOW_MS",
                &defaults.message_rate_limit,
            )?,
            maintenance_interval_secs: parse_or(
                "MAINTENANCE_INTERVAL_SECS",
                defaults.maintenance_interval_secs,
            )?,
            bucket_idle_secs: parse_or("BUCKET_IDLE_SECS", defaults.bucket_idle_secs)?,
        })
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }

    pub fn bucket_idle(&self) -> Duration {
        Duration::from_secs(self.bucket_idle_secs)
    }
}

// 未设置时使用默认值，设置了但无法解析则报错
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn rate_limit_from_env(
    requests_var: &'static str,
    window_var: &'static str,
    default: &RateLimitConfig,
) -> Result<RateLimitConfig, ConfigError> {
    let max_tokens = parse_or(requests_var, default.max_tokens())?;
    let window_ms = parse_or(window_var, default.window().as_millis() as u64)?;
    RateLimitConfig::new(
        max_tokens,
        Duration::from_millis(window_ms),
        default.message(),
    )
}
