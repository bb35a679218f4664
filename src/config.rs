//! Configuration types, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Port for the web front-end.
    pub http_port: u16,
    /// Allowed CORS origins. `*` allows any.
    pub cors_origins: Vec<String>,
    /// Upper bound on concurrent responder calls.
    pub max_concurrent_replies: usize,
    pub session: SessionConfig,
    /// Present when `TELEGRAM_BOT_TOKEN` is set.
    pub telegram: Option<TelegramConfig>,
    /// Present when `LEAD_NOTIFY_SMTP_HOST` is set.
    pub smtp: Option<SmtpConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/lead-assist.db"),
            http_port: 8080,
            cors_origins: vec!["*".to_string()],
            max_concurrent_replies: 20,
            session: SessionConfig::default(),
            telegram: None,
            smtp: None,
        }
    }
}

/// Session lifecycle tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Caller-imposed bound on each store load/upsert.
    pub store_timeout: Duration,
    /// Idle time after which a session is marked abandoned and evicted.
    pub idle_timeout: Duration,
    /// How often the idle sweep runs.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(2000),
            idle_timeout: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids. `*` or empty allows everyone.
    pub allowed_users: Vec<String>,
}

/// SMTP settings for lead notifications.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Team inboxes that receive captured leads.
    pub recipients: Vec<String>,
}

impl AppConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let session_defaults = SessionConfig::default();

        let db_path = lookup("LEAD_ASSIST_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let http_port = parse_or(&lookup, "LEAD_ASSIST_HTTP_PORT", defaults.http_port)?;
        let max_concurrent_replies = parse_or(
            &lookup,
            "LEAD_ASSIST_MAX_CONCURRENT_REPLIES",
            defaults.max_concurrent_replies,
        )?;
        if max_concurrent_replies == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LEAD_ASSIST_MAX_CONCURRENT_REPLIES".into(),
                message: "must be at least 1".into(),
            });
        }

        let cors_origins = lookup("LEAD_ASSIST_CORS_ORIGINS")
            .map(|s| split_list(&s))
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.cors_origins);

        let session = SessionConfig {
            store_timeout: Duration::from_millis(parse_or(
                &lookup,
                "LEAD_ASSIST_STORE_TIMEOUT_MS",
                session_defaults.store_timeout.as_millis() as u64,
            )?),
            idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LEAD_ASSIST_SESSION_IDLE_SECS",
                session_defaults.idle_timeout.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "LEAD_ASSIST_SWEEP_INTERVAL_SECS",
                session_defaults.sweep_interval.as_secs(),
            )?),
        };

        let telegram = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: lookup("TELEGRAM_ALLOWED_USERS")
                    .map(|s| split_list(&s))
                    .unwrap_or_else(|| vec!["*".to_string()]),
            });

        let smtp = match lookup("LEAD_NOTIFY_SMTP_HOST").filter(|h| !h.trim().is_empty()) {
            Some(host) => {
                let recipients = lookup("LEAD_NOTIFY_TO")
                    .map(|s| split_list(&s))
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ConfigError::MissingEnvVar("LEAD_NOTIFY_TO".into()))?;
                let username = lookup("LEAD_NOTIFY_SMTP_USERNAME").unwrap_or_default();
                Some(SmtpConfig {
                    port: parse_or(&lookup, "LEAD_NOTIFY_SMTP_PORT", 587)?,
                    password: SecretString::from(
                        lookup("LEAD_NOTIFY_SMTP_PASSWORD").unwrap_or_default(),
                    ),
                    from_address: lookup("LEAD_NOTIFY_FROM").unwrap_or_else(|| username.clone()),
                    username,
                    recipients,
                    host,
                })
            }
            None => None,
        };

        Ok(Self {
            db_path,
            http_port,
            cors_origins,
            max_concurrent_replies,
            session,
            telegram,
            smtp,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
