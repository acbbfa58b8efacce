use std::path::PathBuf;

use chrono::FixedOffset;

use crate::model::*;
use crate::timestamp::parse_utc_offset;

/// Device pools of the motivating ward: two ECG recorders, one BP recorder.
pub const DEFAULT_CATEGORIES: &str = "ECG=2,HA=1";

/// Longest fitting accepted: one leap year.
const MAX_DURATION: Ms = 366 * DAY;

/// Server settings, read from `DEVPOOL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub snapshot_paths: Vec<PathBuf>,
    pub categories: Vec<Category>,
    pub duration: Ms,
    pub utc_offset: FixedOffset,
    pub max_connections: usize,
    /// Seconds between background recomputations; 0 disables them.
    pub refresh_secs: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or("DEVPOOL_PORT", get("DEVPOOL_PORT"), 5434)?;
        let bind = get("DEVPOOL_BIND").unwrap_or_else(|| "0.0.0.0".into());
        let snapshot_paths = get("DEVPOOL_SNAPSHOT")
            .unwrap_or_else(|| "./data/allocations.json".into())
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        if snapshot_paths.is_empty() {
            return Err(ConfigError::Invalid("DEVPOOL_SNAPSHOT", "no paths".into()));
        }

        let categories =
            parse_categories(&get("DEVPOOL_CATEGORIES").unwrap_or_else(|| DEFAULT_CATEGORIES.into()))?;

        let hours: i64 = parse_or("DEVPOOL_DURATION_HOURS", get("DEVPOOL_DURATION_HOURS"), 24)?;
        if hours <= 0 {
            return Err(ConfigError::Invalid(
                "DEVPOOL_DURATION_HOURS",
                format!("{hours} is not positive"),
            ));
        }
        let duration = hours
            .checked_mul(HOUR)
            .filter(|d| *d <= MAX_DURATION)
            .ok_or_else(|| {
                ConfigError::Invalid("DEVPOOL_DURATION_HOURS", format!("{hours} is too large"))
            })?;

        let utc_offset = match get("DEVPOOL_UTC_OFFSET") {
            Some(raw) => parse_utc_offset(&raw)
                .ok_or_else(|| ConfigError::Invalid("DEVPOOL_UTC_OFFSET", raw.clone()))?,
            None => FixedOffset::east_opt(0).ok_or(ConfigError::Invalid("DEVPOOL_UTC_OFFSET", "+00:00".into()))?,
        };

        let metrics_port = match get("DEVPOOL_METRICS_PORT") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("DEVPOOL_METRICS_PORT", raw.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            bind,
            port,
            snapshot_paths,
            categories,
            duration,
            utc_offset,
            max_connections: parse_or("DEVPOOL_MAX_CONNECTIONS", get("DEVPOOL_MAX_CONNECTIONS"), 256)?,
            refresh_secs: parse_or("DEVPOOL_REFRESH_SECS", get("DEVPOOL_REFRESH_SECS"), 30)?,
            metrics_port,
            tls_cert: get("DEVPOOL_TLS_CERT"),
            tls_key: get("DEVPOOL_TLS_KEY"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw.clone())),
        None => Ok(default),
    }
}

/// Parse `NAME=CAPACITY` pairs separated by commas, e.g. `ECG=2,HA=1`.
pub fn parse_categories(raw: &str) -> Result<Vec<Category>, ConfigError> {
    let mut categories: Vec<Category> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, capacity) = part
            .split_once('=')
            .ok_or_else(|| ConfigError::Invalid("DEVPOOL_CATEGORIES", part.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::Invalid("DEVPOOL_CATEGORIES", part.to_string()));
        }
        let capacity: u32 = capacity
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("DEVPOOL_CATEGORIES", part.to_string()))?;
        if categories.iter().any(|c| c.matches(name)) {
            return Err(ConfigError::DuplicateCategory(name.to_string()));
        }
        categories.push(Category::new(name, capacity));
    }
    if categories.is_empty() {
        return Err(ConfigError::Invalid("DEVPOOL_CATEGORIES", raw.to_string()));
    }
    Ok(categories)
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, String),
    DuplicateCategory(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(key, value) => write!(f, "invalid {key}: {value:?}"),
            ConfigError::DuplicateCategory(name) => write!(f, "category {name} configured twice"),
        }
    }
}

impl std::error::Error for ConfigError {}
