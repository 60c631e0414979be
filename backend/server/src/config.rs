use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use crate::identity::{EmptySalt, Salt};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Secret {0} not found in /run/secrets or the environment")]
    MissingSecret(String),

    #[error(transparent)]
    EmptySalt(#[from] EmptySalt),
}

/// Write-side rules that are tunable per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub feedback_daily_limit: u32,
    pub feedback_max_chars: usize,
    pub unique_quiz_answers: bool,
    pub storage_timeout: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            feedback_daily_limit: 3,
            feedback_max_chars: 1000,
            unique_quiz_answers: false,
            storage_timeout: Duration::from_millis(2000),
        }
    }
}

pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub catalog_path: PathBuf,
    pub geoip_path: PathBuf,
    pub policy: Policy,
    pub salt: Salt,
    pub platform_user: String,
    pub platform_password: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let platform_password = read_secret("PLATFORM_ADMIN_PASS")?;
        if platform_password.is_empty() {
            return Err(ConfigError::MissingSecret("PLATFORM_ADMIN_PASS".to_string()));
        }

        Ok(Self {
            port: try_load("RUST_PORT", "8000")?,
            db_path: try_load("DB_PATH", "/data/campaign.db")?,
            catalog_path: try_load("CATALOG_PATH", "/app/config/catalog.json")?,
            geoip_path: try_load("GEOIP_PATH", "/data/geoip/GeoLite2-City.mmdb")?,
            policy: Policy {
                feedback_daily_limit: try_load("FEEDBACK_DAILY_LIMIT", "3")?,
                feedback_max_chars: try_load("FEEDBACK_MAX_CHARS", "1000")?,
                unique_quiz_answers: try_load("UNIQUE_QUIZ_ANSWERS", "false")?,
                storage_timeout: Duration::from_millis(try_load("STORAGE_TIMEOUT_MS", "2000")?),
            },
            salt: Salt::new(read_secret("ANALYTICS_SALT")?)?,
            platform_user: try_load("PLATFORM_ADMIN_USER", "admin")?,
            platform_password,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    parse(key, var(key), default)
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = value.unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }
    })
}

fn read_secret(secret_name: &str) -> Result<String, ConfigError> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            info!("Failed to read {secret_name} from file: {e}, trying environment");
            var(secret_name)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| ConfigError::MissingSecret(secret_name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = Policy::default();

        assert_eq!(policy.feedback_daily_limit, 3);
        assert_eq!(policy.feedback_max_chars, 1000);
        assert!(!policy.unique_quiz_answers);
        assert_eq!(policy.storage_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_parse_uses_default() {
        let port: u16 = parse("RUST_PORT", None, "8000").unwrap();
        assert_eq!(port, 8000);

        let flag: bool = parse("UNIQUE_QUIZ_ANSWERS", Some(" true ".to_string()), "false").unwrap();
        assert!(flag);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result: Result<u32, _> = parse("FEEDBACK_DAILY_LIMIT", Some("three".to_string()), "3");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "FEEDBACK_DAILY_LIMIT"
        ));
    }
}
