use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub channel: ChannelConfig,
    /// Path of the SQLite index file
    pub database_path: String,
    pub bind_address: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Upper bound on a single call to the storage channel
    pub backend_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot API token. Without one the chat dispatcher does not run.
    pub token: Option<String>,
    pub api_url: String,
    /// Long-poll timeout for `getUpdates`
    pub poll_timeout: Duration,
    /// Web app opened by the `/start` and `/ui` buttons
    pub miniapp_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelBackend {
    Local,
    Telegram,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub backend: ChannelBackend,
    /// Telegram channel id (`-100…` or `@name`), required for the telegram backend
    pub channel_id: Option<String>,
    /// Directory for the local backend
    pub local_path: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout: Duration::from_secs(30),
            miniapp_url: None,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            backend: ChannelBackend::Telegram,
            channel_id: None,
            local_path: "./channel".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match var("CHANNEL_BACKEND")
            .unwrap_or_else(|| "telegram".to_string())
            .to_lowercase()
            .as_str()
        {
            "telegram" => ChannelBackend::Telegram,
            "local" => ChannelBackend::Local,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "CHANNEL_BACKEND must be 'telegram' or 'local', got '{other}'"
                )))
            }
        };

        let database_path = var("DATABASE_PATH").ok_or(ConfigError::Missing("DATABASE_PATH"))?;

        let config = Config {
            bot: BotConfig {
                token: var("BOT_TOKEN"),
                api_url: var("TELEGRAM_API_URL").unwrap_or_else(|| BotConfig::default().api_url),
                poll_timeout: Duration::from_secs(parse_number(&var, "POLL_TIMEOUT_SECS", 30)?),
                miniapp_url: var("MINIAPP_URL"),
            },
            channel: ChannelConfig {
                backend,
                channel_id: var("CHANNEL_ID"),
                local_path: var("LOCAL_CHANNEL_PATH")
                    .unwrap_or_else(|| ChannelConfig::default().local_path),
            },
            database_path,
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            max_upload_size: parse_number(&var, "MAX_UPLOAD_SIZE", 50 * 1024 * 1024)?, // 50MB
            backend_timeout: Duration::from_secs(parse_number(&var, "BACKEND_TIMEOUT_SECS", 60)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.backend == ChannelBackend::Telegram {
            if self.bot.token.is_none() {
                return Err(ConfigError::Missing("BOT_TOKEN"));
            }
            if self.channel.channel_id.is_none() {
                return Err(ConfigError::Missing("CHANNEL_ID"));
            }
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.backend_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "BACKEND_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.channel.backend == ChannelBackend::Local && self.bot.token.is_none() {
            tracing::warn!("No BOT_TOKEN set; running the HTTP upload API only");
        }

        Ok(())
    }
}

fn parse_number<F>(var: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|_| {
            ConfigError::ValidationError(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
        None => Ok(default),
    }
}
