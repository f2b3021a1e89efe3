use crate::constants::{
    ATTIO_API_BASE_URL, ATTIO_DASHBOARD_URL, DEFAULT_BATCH_SIZE, DEFAULT_LOG_DIR,
    DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::error::{CrmError, Result};
use crate::retry::RetryPolicy;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_ATTIO_API_TOKEN: &str = "ATTIO_API_TOKEN";
pub const ENV_ATTIO_BASE_URL: &str = "ATTIO_BASE_URL";
pub const ENV_ATTIO_DASHBOARD_URL: &str = "ATTIO_DASHBOARD_URL";
pub const ENV_TWENTY_BASE_URL: &str = "TWENTY_BASE_URL";
pub const ENV_TWENTY_API_KEY: &str = "TWENTY_API_KEY";
pub const ENV_BATCH_SIZE: &str = "BATCH_SIZE";
pub const ENV_REQUEST_TIMEOUT: &str = "REQUEST_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_LOG_DIR: &str = "MIGRATION_LOG_DIR";

/// Runtime configuration, read from the environment after the env file is loaded.
///
/// Credentials are optional here; each command asks for the ones it needs so
/// that a missing Twenty key does not block `find-duplicates`.
#[derive(Debug, Clone)]
pub struct Config {
    pub attio_api_token: Option<String>,
    pub attio_base_url: String,
    pub attio_dashboard_url: String,
    pub twenty_base_url: Option<String>,
    pub twenty_api_key: Option<String>,
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub log_dir: PathBuf,
}

impl Config {
    /// Load the env file (if present) and read the configuration.
    pub fn load(env_file: &Path) -> Result<Self> {
        match dotenv::from_path(env_file) {
            Ok(()) => debug!("Loaded environment from {}", env_file.display()),
            Err(e) => debug!("No env file loaded from {}: {}", env_file.display(), e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let batch_size = parse_number(ENV_BATCH_SIZE, get(ENV_BATCH_SIZE), DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(CrmError::Config(format!("{ENV_BATCH_SIZE} must be at least 1")));
        }
        let timeout_secs = parse_number(
            ENV_REQUEST_TIMEOUT,
            get(ENV_REQUEST_TIMEOUT),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        let max_retries = parse_number(ENV_MAX_RETRIES, get(ENV_MAX_RETRIES), DEFAULT_MAX_RETRIES)?;
        if max_retries == 0 {
            return Err(CrmError::Config(format!("{ENV_MAX_RETRIES} must be at least 1")));
        }

        Ok(Self {
            attio_api_token: get(ENV_ATTIO_API_TOKEN),
            attio_base_url: get(ENV_ATTIO_BASE_URL).unwrap_or_else(|| ATTIO_API_BASE_URL.to_string()),
            attio_dashboard_url: get(ENV_ATTIO_DASHBOARD_URL)
                .unwrap_or_else(|| ATTIO_DASHBOARD_URL.to_string()),
            twenty_base_url: get(ENV_TWENTY_BASE_URL),
            twenty_api_key: get(ENV_TWENTY_API_KEY),
            batch_size,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries,
            log_dir: get(ENV_LOG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        })
    }

    /// The Attio token, or a configuration error naming the variable.
    pub fn attio_token(&self) -> Result<&str> {
        self.attio_api_token
            .as_deref()
            .ok_or_else(|| CrmError::MissingConfig(vec![ENV_ATTIO_API_TOKEN.to_string()]))
    }

    /// Every variable the migration needs that is not set.
    pub fn missing_for_migration(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.twenty_base_url.is_none() {
            missing.push(ENV_TWENTY_BASE_URL.to_string());
        }
        if self.twenty_api_key.is_none() {
            missing.push(ENV_TWENTY_API_KEY.to_string());
        }
        if self.attio_api_token.is_none() {
            missing.push(ENV_ATTIO_API_TOKEN.to_string());
        }
        missing
    }

    pub fn validate_migration(&self) -> Result<()> {
        let missing = self.missing_for_migration();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CrmError::MissingConfig(missing))
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }
}

fn parse_number<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e| CrmError::Config(format!("{key}='{value}' is not a valid number: {e}"))),
    }
}

/// Show enough of a secret to recognise it without leaking it.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.attio_base_url, "https://api.attio.com/v2");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert!(config.attio_api_token.is_none());
    }

    #[test]
    fn test_numeric_overrides() {
        let config = config_from(&[
            ("BATCH_SIZE", "10"),
            ("REQUEST_TIMEOUT", "5"),
            ("MAX_RETRIES", "7"),
        ])
        .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 7);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = config_from(&[("BATCH_SIZE", "lots")]).unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
        assert!(err.to_string().contains("BATCH_SIZE"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(config_from(&[("BATCH_SIZE", "0")]).is_err());
        assert!(config_from(&[("MAX_RETRIES", "0")]).is_err());
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = config_from(&[("ATTIO_API_TOKEN", "   "), ("TWENTY_BASE_URL", "http://crm")]).unwrap();
        assert!(config.attio_token().is_err());
        assert_eq!(
            config.missing_for_migration(),
            vec!["TWENTY_API_KEY".to_string(), "ATTIO_API_TOKEN".to_string()]
        );
    }

    #[test]
    fn test_validate_migration_passes_with_all_credentials() {
        let config = config_from(&[
            ("ATTIO_API_TOKEN", "tok"),
            ("TWENTY_BASE_URL", "http://crm"),
            ("TWENTY_API_KEY", "key"),
        ])
        .unwrap();
        assert!(config.validate_migration().is_ok());
        assert_eq!(config.attio_token().unwrap(), "tok");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("abcdefghijklmnop"), "abcdefgh...mnop");
        assert_eq!(mask_secret("short"), "***");
    }
}
