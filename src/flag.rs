use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::rule::RolloutRule;

/// Longest key a flag may have, in characters.
pub const MAX_KEY_LENGTH: usize = 100;

pub type Metadata = Map<String, Value>;

/// A named boolean feature toggle with its rollout rule.
///
/// Flags are created and timestamped by [crate::FlagRepository]; the key never changes after
/// creation and `updated_at` is never earlier than `created_at`. Records that break either
/// rule fail to deserialize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FlagRecord")]
pub struct FeatureFlag {
    key: String,
    enabled: bool,
    description: Option<String>,
    #[serde(rename = "rules")]
    rule: RolloutRule,
    metadata: Option<Metadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn enabled_by_default() -> bool {
    true
}

// Stored shape of a flag, checked before it becomes a FeatureFlag.
#[derive(Deserialize)]
struct FlagRecord {
    key: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "rules", default)]
    rule: RolloutRule,
    #[serde(default)]
    metadata: Option<Metadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlagRecord> for FeatureFlag {
    type Error = String;

    fn try_from(record: FlagRecord) -> std::result::Result<Self, Self::Error> {
        FeatureFlag::validate_key(&record.key).map_err(|e| e.to_string())?;
        if record.updated_at < record.created_at {
            return Err(format!(
                "flag {} was updated at {} before it was created at {}",
                record.key, record.updated_at, record.created_at
            ));
        }
        Ok(FeatureFlag {
            key: record.key,
            enabled: record.enabled,
            description: record.description,
            rule: record.rule,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl FeatureFlag {
    /// Check `key` against the flag key rules.
    pub fn validate_key(key: &str) -> Result<()> {
        let reason = if key.is_empty() {
            "key must not be empty"
        } else if key.chars().count() > MAX_KEY_LENGTH {
            "key must be at most 100 characters"
        } else {
            return Ok(());
        };
        Err(Error::InvalidKey {
            key: key.to_string(),
            reason,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The master switch. When false the flag evaluates as disabled whatever its rule says.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn rule(&self) -> &RolloutRule {
        &self.rule
    }

    /// Caller-supplied data carried with the flag. Never read during evaluation.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        // Clock skew must not break updated_at >= created_at.
        self.updated_at = now.max(self.created_at);
    }
}

/// The caller-supplied fields of a flag that is about to be created.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct NewFlag {
    pub key: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "rules", default)]
    pub rule: RolloutRule,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl NewFlag {
    /// Start an enabled flag with the [RolloutRule::All] rule.
    pub fn new(key: impl Into<String>) -> Self {
        NewFlag {
            key: key.into(),
            enabled: true,
            description: None,
            rule: RolloutRule::All,
            metadata: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn rule(mut self, rule: RolloutRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub(crate) fn into_flag(self, now: DateTime<Utc>) -> FeatureFlag {
        FeatureFlag {
            key: self.key,
            enabled: self.enabled,
            description: self.description,
            rule: self.rule,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A partial update. Only the fields that are set replace the flag's current values.
///
/// `description` and `metadata` are doubly optional: `Some(None)` clears the field, `None`
/// leaves it alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlagUpdate {
    pub enabled: Option<bool>,
    pub description: Option<Option<String>>,
    pub rule: Option<RolloutRule>,
    pub metadata: Option<Option<Metadata>>,
}

impl FlagUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Some(description.into()));
        self
    }

    pub fn clear_description(mut self) -> Self {
        self.description = Some(None);
        self
    }

    pub fn rule(mut self, rule: RolloutRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(Some(metadata));
        self
    }

    pub fn clear_metadata(mut self) -> Self {
        self.metadata = Some(None);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &FlagUpdate::default()
    }

    pub(crate) fn apply(self, flag: &mut FeatureFlag, now: DateTime<Utc>) {
        if let Some(enabled) = self.enabled {
            flag.enabled = enabled;
        }
        if let Some(description) = self.description {
            flag.description = description;
        }
        if let Some(rule) = self.rule {
            flag.rule = rule;
        }
        if let Some(metadata) = self.metadata {
            flag.metadata = metadata;
        }
        flag.touch(now);
    }
}
