use thiserror::Error;

/// Failures a caller of [crate::FlagRepository] can observe.
///
/// Store outages and unparsable stored entries are never reported through this type; the
/// repository logs them and carries on as if the entry were absent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A flag with this key already resolves from the cache or the durable store.
    #[error("feature flag '{0}' already exists")]
    AlreadyExists(String),

    /// No flag with this key resolves from either tier.
    #[error("feature flag '{0}' not found")]
    NotFound(String),

    /// The key violates the flag key rules (non-empty, at most 100 characters).
    #[error("invalid feature flag key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn error_messages_name_the_key() {
        assert_that!(Error::AlreadyExists("f5".into()).to_string())
            .is_equal_to("feature flag 'f5' already exists".to_string());
        assert_that!(Error::NotFound("gone".into()).to_string())
            .is_equal_to("feature flag 'gone' not found".to_string());
        assert_that!(Error::InvalidKey {
            key: "".into(),
            reason: "key must not be empty",
        }
        .to_string())
        .is_equal_to("invalid feature flag key '': key must not be empty".to_string());
    }
}
