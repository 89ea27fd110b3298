use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use teloxide::types::UserId;
use tracing_appender::rolling::Rotation;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    Missing(&'static str),
    /// A variable is set but cannot be parsed.
    Invalid { name: &'static str, value: String, reason: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(name) => write!(f, "missing required variable {}", name),
            Self::Invalid { name, value, reason } => {
                write!(f, "invalid value '{}' for {}: {}", value, name, reason)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Event format for both log outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

const DEFAULT_DB_URL: &str = "sqlite://data/database.db";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_MAX_FILES: usize = 7;
const DEFAULT_THROTTLE_MS: u64 = 100;
const DEFAULT_THROTTLE_CAPACITY: u64 = 10_000;

pub struct Config {
    pub bot_token: String,
    /// Administrators: receive lifecycle notices and may use `/admin`.
    pub admin_ids: Vec<UserId>,
    pub log_format: LogFormat,
    pub log_rotation: Rotation,
    /// Number of rotated log files kept on disk.
    pub log_max_files: usize,
    pub log_dir: PathBuf,
    pub db_url: String,
    /// Minimum interval between two admitted events from the same user.
    pub throttle_window: Duration,
    /// Upper bound on live throttle entries.
    pub throttle_capacity: u64,
}

impl Config {
    /// Load from the process environment, seeded from `.env` when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is fine, real deployments set the variables directly.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = bot_token.trim().split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let raw_admins = get("ADMIN_IDS").ok_or(ConfigError::Missing("ADMIN_IDS"))?;
        let admin_ids = parse_admin_ids(&raw_admins)?;
        if admin_ids.is_empty() {
            return Err(ConfigError::Validation("ADMIN_IDS must contain at least one administrator ID".into()));
        }

        let log_format = match get("FORMAT_LOG") {
            Some(v) => LogFormat::parse(&v).ok_or_else(|| ConfigError::Invalid {
                name: "FORMAT_LOG",
                value: v.clone(),
                reason: "expected one of full, compact, pretty".into(),
            })?,
            None => LogFormat::Full,
        };

        let log_rotation = match get("LOG_ROTATION") {
            Some(v) => parse_rotation(&v).ok_or_else(|| ConfigError::Invalid {
                name: "LOG_ROTATION",
                value: v.clone(),
                reason: "expected one of minutely, hourly, daily, never".into(),
            })?,
            None => Rotation::DAILY,
        };

        let log_max_files = parse_positive(get("LOG_MAX_FILES"), "LOG_MAX_FILES", DEFAULT_LOG_MAX_FILES as u64)? as usize;
        let throttle_ms = parse_positive(get("THROTTLE_MS"), "THROTTLE_MS", DEFAULT_THROTTLE_MS)?;
        let throttle_capacity = parse_positive(get("THROTTLE_CAPACITY"), "THROTTLE_CAPACITY", DEFAULT_THROTTLE_CAPACITY)?;

        let log_dir = get("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let db_url = get("DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            admin_ids,
            log_format,
            log_rotation,
            log_max_files,
            log_dir,
            db_url,
            throttle_window: Duration::from_millis(throttle_ms),
            throttle_capacity,
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

/// Accepts a JSON list (`[1, 2]`) or a comma separated list (`1,2`).
fn parse_admin_ids(raw: &str) -> Result<Vec<UserId>, ConfigError> {
    let raw = raw.trim();
    let ids: Vec<u64> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            name: "ADMIN_IDS",
            value: raw.to_string(),
            reason: e.to_string(),
        })?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "ADMIN_IDS",
                    value: s.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<_, _>>()?
    };

    let mut admin_ids: Vec<UserId> = Vec::with_capacity(ids.len());
    for id in ids.into_iter().map(UserId) {
        if !admin_ids.contains(&id) {
            admin_ids.push(id);
        }
    }
    Ok(admin_ids)
}

fn parse_rotation(value: &str) -> Option<Rotation> {
    match value.trim().to_lowercase().as_str() {
        "minutely" => Some(Rotation::MINUTELY),
        "hourly" => Some(Rotation::HOURLY),
        "daily" => Some(Rotation::DAILY),
        "never" => Some(Rotation::NEVER),
        _ => None,
    }
}

fn parse_positive(value: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid { name, value, reason: "must be greater than zero".into() }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid { name, value: value.clone(), reason: e.to_string() }),
    }
}
