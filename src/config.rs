use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
/// Longest accepted cache TTL: 30 days.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "feature_flag:";
pub const DEFAULT_STORE_PREFIX: &str = "/feature-flags";

/// Settings for the flag repository and the two stores behind it.
///
/// Both stores are disabled unless configured otherwise; the repository stays correct with
/// either or both of them off.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub cache: CacheConfig,
    pub store: ParameterStoreConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(rename = "ttl_secs", deserialize_with = "deserialize_ttl")]
    pub ttl: Duration,
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: false,
            ttl: DEFAULT_CACHE_TTL,
            key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
        }
    }
}

impl CacheConfig {
    pub(crate) fn cache_key(&self, flag_key: &str) -> String {
        format!("{}{}", self.key_prefix, flag_key)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParameterStoreConfig {
    pub enabled: bool,
    /// Namespace every flag is stored under, e.g. `/feature-flags`.
    pub prefix: String,
}

impl Default for ParameterStoreConfig {
    fn default() -> Self {
        ParameterStoreConfig {
            enabled: false,
            prefix: DEFAULT_STORE_PREFIX.to_string(),
        }
    }
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    ttl_from_secs(secs).map_err(serde::de::Error::custom)
}

fn ttl_from_secs(secs: u64) -> Result<Duration, String> {
    if secs == 0 {
        return Err("cache TTL must be at least one second".to_string());
    }
    let ttl = Duration::from_secs(secs);
    if ttl > MAX_CACHE_TTL {
        return Err(format!(
            "cache TTL must be at most {} seconds",
            MAX_CACHE_TTL.as_secs()
        ));
    }
    Ok(ttl)
}

impl RepositoryConfig {
    /// Load settings from the process environment.
    ///
    /// Reads `REDIS_ENABLED`, `FEATURE_FLAG_CACHE_TTL` (seconds), `SSM_ENABLED` and
    /// `SSM_PREFIX`. Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut config = RepositoryConfig::default();

        if let Some(enabled) = var("REDIS_ENABLED") {
            config.cache.enabled = parse_bool("REDIS_ENABLED", &enabled)?;
        }
        if let Some(ttl) = var("FEATURE_FLAG_CACHE_TTL") {
            let secs = ttl.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "FEATURE_FLAG_CACHE_TTL".to_string(),
                message: format!("invalid number of seconds '{}'", ttl),
            })?;
            config.cache.ttl = ttl_from_secs(secs).map_err(|message| ConfigError::InvalidValue {
                key: "FEATURE_FLAG_CACHE_TTL".to_string(),
                message,
            })?;
        }
        if let Some(enabled) = var("SSM_ENABLED") {
            config.store.enabled = parse_bool("SSM_ENABLED", &enabled)?;
        }
        if let Some(prefix) = var("SSM_PREFIX") {
            config.store.prefix = prefix;
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("invalid boolean '{}'", value),
        }),
    }
}
