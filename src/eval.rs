use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::bucket::bucket;
use crate::flag::FeatureFlag;
use crate::rule::{Percentage, RolloutRule};

/// Free-form attributes of the subject being evaluated. Rules do not read it yet.
pub type EvaluationContext = Map<String, Value>;

/// The tier that answered a flag lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Store,
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Cache => "cache",
            Source::Store => "store",
            Source::None => "none",
        })
    }
}

/// A flag together with the tier it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub flag: FeatureFlag,
    pub source: Source,
}

/// MatchedRule explains which branch of evaluation produced the result.
///
/// It serializes to the flat string tags consumers match on, e.g. `percentage_25`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchedRule {
    /// No flag with the requested key exists.
    NotFound,
    /// The flag's master switch is off.
    Disabled,
    /// The flag's rule is [RolloutRule::All].
    All,
    /// The subject is on the flag's user list.
    UserList,
    /// The subject is missing or not on the flag's user list.
    UserNotInList,
    /// The subject's bucket fell below the rollout percentage.
    Percentage(Percentage),
    /// The subject is missing or its bucket is at or above the rollout percentage.
    PercentageNotMatched,
    /// The rule kind has no evaluation logic.
    NoRuleMatched,
}

impl fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedRule::NotFound => f.write_str("not_found"),
            MatchedRule::Disabled => f.write_str("disabled"),
            MatchedRule::All => f.write_str("all"),
            MatchedRule::UserList => f.write_str("user_list"),
            MatchedRule::UserNotInList => f.write_str("user_not_in_list"),
            MatchedRule::Percentage(p) => write!(f, "percentage_{}", p),
            MatchedRule::PercentageNotMatched => f.write_str("percentage_not_matched"),
            MatchedRule::NoRuleMatched => f.write_str("no_rule_matched"),
        }
    }
}

impl Serialize for MatchedRule {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// The outcome of evaluating one flag for one subject.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub key: String,
    pub enabled: bool,
    pub matched_rule: MatchedRule,
    pub source: Source,
}

impl EvaluationResult {
    fn new(key: &str, enabled: bool, matched_rule: MatchedRule, source: Source) -> Self {
        EvaluationResult {
            key: key.to_string(),
            enabled,
            matched_rule,
            source,
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::new(key, false, MatchedRule::NotFound, Source::None)
    }
}

/// Evaluate the flag `key` for `subject_id`.
///
/// `resolved` is the flag as looked up by the caller, or None when no such flag exists. The
/// result depends only on the flag definition and `subject_id`, so a subject keeps its
/// percentage bucket across restarts and cache evictions. `context` is accepted for rule kinds
/// that need subject attributes; none of the current kinds read it.
pub fn evaluate(
    key: &str,
    resolved: Option<&Resolved>,
    subject_id: Option<&str>,
    _context: Option<&EvaluationContext>,
) -> EvaluationResult {
    let Resolved { flag, source } = match resolved {
        Some(resolved) => resolved,
        None => return EvaluationResult::not_found(key),
    };

    if !flag.enabled() {
        return EvaluationResult::new(key, false, MatchedRule::Disabled, *source);
    }

    let subject_id = subject_id.filter(|id| !id.is_empty());
    let (enabled, matched_rule) = match flag.rule() {
        RolloutRule::All => (true, MatchedRule::All),
        RolloutRule::UserList(ids) => match subject_id {
            Some(id) if ids.iter().any(|candidate| candidate == id) => {
                (true, MatchedRule::UserList)
            }
            _ => (false, MatchedRule::UserNotInList),
        },
        RolloutRule::Percentage(p) => match subject_id {
            Some(id) if bucket(flag.key(), id) < p.value() => (true, MatchedRule::Percentage(*p)),
            _ => (false, MatchedRule::PercentageNotMatched),
        },
        RolloutRule::Custom(_) => (false, MatchedRule::NoRuleMatched),
    };

    EvaluationResult::new(key, enabled, matched_rule, *source)
}
