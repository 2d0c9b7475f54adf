use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A rollout percentage, always within `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentage(u8);

impl Percentage {
    pub const MAX: u8 = 100;

    /// Returns None when `value` is above 100.
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Percentage(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RolloutRule decides which subjects see an enabled flag as enabled.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "RuleRepr", try_from = "RuleRepr")]
pub enum RolloutRule {
    /// Every subject matches.
    #[default]
    All,
    /// A subject matches when its bucket for this flag is below the percentage.
    Percentage(Percentage),
    /// A subject matches when its id is in the list, compared exactly.
    UserList(Vec<String>),
    /// Reserved for future rule kinds. Never matches.
    Custom(Map<String, Value>),
}

impl RolloutRule {
    /// Build a percentage rule, or None when `percentage` is above 100.
    pub fn percentage(percentage: u8) -> Option<Self> {
        Percentage::new(percentage).map(RolloutRule::Percentage)
    }

    pub fn user_list<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RolloutRule::UserList(ids.into_iter().map(Into::into).collect())
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            RolloutRule::All => Strategy::All,
            RolloutRule::Percentage(_) => Strategy::Percentage,
            RolloutRule::UserList(_) => Strategy::UserList,
            RolloutRule::Custom(_) => Strategy::Custom,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    All,
    Percentage,
    UserList,
    Custom,
}

// Stored shape of a rule: one object for every strategy, with only the fields for that
// strategy populated. Absent payloads decode to their empty form so that records written by
// other tools still load.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RuleRepr {
    #[serde(default)]
    strategy: Strategy,
    #[serde(default)]
    percentage: Option<i64>,
    #[serde(default)]
    user_ids: Option<Vec<String>>,
    #[serde(default)]
    custom_rules: Option<Map<String, Value>>,
}

impl From<RolloutRule> for RuleRepr {
    fn from(rule: RolloutRule) -> Self {
        let strategy = rule.strategy();
        let mut repr = RuleRepr {
            strategy,
            ..RuleRepr::default()
        };
        match rule {
            RolloutRule::All => (),
            RolloutRule::Percentage(p) => repr.percentage = Some(p.value().into()),
            RolloutRule::UserList(ids) => repr.user_ids = Some(ids),
            RolloutRule::Custom(data) => repr.custom_rules = Some(data),
        }
        repr
    }
}

impl TryFrom<RuleRepr> for RolloutRule {
    type Error = String;

    fn try_from(repr: RuleRepr) -> Result<Self, Self::Error> {
        // A stored percentage must be in range even when the strategy ignores it.
        let percentage = repr
            .percentage
            .map(|raw| {
                u8::try_from(raw)
                    .ok()
                    .and_then(Percentage::new)
                    .ok_or_else(|| format!("percentage {} is outside 0..=100", raw))
            })
            .transpose()?;
        Ok(match repr.strategy {
            Strategy::All => RolloutRule::All,
            Strategy::Percentage => RolloutRule::Percentage(percentage.unwrap_or(Percentage(0))),
            Strategy::UserList => RolloutRule::UserList(repr.user_ids.unwrap_or_default()),
            Strategy::Custom => RolloutRule::Custom(repr.custom_rules.unwrap_or_default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;
    use spectral::prelude::*;
    use test_case::test_case;

    #[test_case(0, true)]
    #[test_case(50, true)]
    #[test_case(100, true)]
    #[test_case(101, false)]
    #[test_case(255, false)]
    fn percentage_bounds(value: u8, valid: bool) {
        assert_eq!(Percentage::new(value).is_some(), valid);
        assert_eq!(RolloutRule::percentage(value).is_some(), valid);
    }

    #[test]
    fn test_parse_rules() {
        let all: RolloutRule = serde_json::from_str(r#"{"strategy":"all"}"#).expect("should parse");
        assert_that!(all).is_equal_to(RolloutRule::All);

        let defaulted: RolloutRule = serde_json::from_str(r#"{}"#).expect("should parse");
        assert_that!(defaulted).is_equal_to(RolloutRule::All);

        let pct: RolloutRule =
            serde_json::from_str(r#"{"strategy":"percentage","percentage":25}"#)
                .expect("should parse");
        assert_that!(pct).is_equal_to(RolloutRule::percentage(25).unwrap());

        let users: RolloutRule =
            serde_json::from_str(r#"{"strategy":"user_list","user_ids":["user1","user2"]}"#)
                .expect("should parse");
        assert_that!(users).is_equal_to(RolloutRule::user_list(["user1", "user2"]));

        let custom: RolloutRule = serde_json::from_str(
            r#"{"strategy":"custom","custom_rules":{"region":"eu"}}"#,
        )
        .expect("should parse");
        let mut expected = Map::new();
        expected.insert("region".into(), json!("eu"));
        assert_that!(custom).is_equal_to(RolloutRule::Custom(expected));
    }

    #[test]
    fn missing_payloads_decode_to_empty_forms() {
        let pct: RolloutRule =
            serde_json::from_str(r#"{"strategy":"percentage","percentage":null}"#)
                .expect("should parse");
        assert_that!(pct).is_equal_to(RolloutRule::percentage(0).unwrap());

        let users: RolloutRule =
            serde_json::from_str(r#"{"strategy":"user_list"}"#).expect("should parse");
        assert_that!(users).is_equal_to(RolloutRule::UserList(vec![]));

        let custom: RolloutRule =
            serde_json::from_str(r#"{"strategy":"custom","custom_rules":null}"#)
                .expect("should parse");
        assert_that!(custom).is_equal_to(RolloutRule::Custom(Map::new()));
    }

    #[test_case(r#"{"strategy":"percentage","percentage":101}"# ; "percentage above range")]
    #[test_case(r#"{"strategy":"percentage","percentage":-1}"# ; "negative percentage")]
    #[test_case(r#"{"strategy":"segment"}"# ; "unknown strategy")]
    #[test_case(r#"{"strategy":"all","percentage":150}"# ; "unused percentage above range")]
    #[test_case(r#"{"strategy":"user_list","user_ids":[],"percentage":-5}"# ; "unused negative percentage")]
    #[test_case(r#"{"strategy":"user_list","user_ids":"user1"}"# ; "user ids not a list")]
    fn rejects_invalid_rules(json: &str) {
        assert_that!(serde_json::from_str::<RolloutRule>(json)).is_err();
    }

    #[test]
    fn in_range_percentage_is_ignored_by_other_strategies() {
        let all: RolloutRule =
            serde_json::from_str(r#"{"strategy":"all","percentage":30}"#).expect("should parse");
        assert_that!(all).is_equal_to(RolloutRule::All);
    }

    #[test]
    fn serializes_every_field() {
        assert_json_eq!(
            serde_json::to_value(RolloutRule::percentage(40).unwrap()).unwrap(),
            json!({
                "strategy": "percentage",
                "percentage": 40,
                "user_ids": null,
                "custom_rules": null
            })
        );
        assert_json_eq!(
            serde_json::to_value(RolloutRule::user_list(["a"])).unwrap(),
            json!({
                "strategy": "user_list",
                "percentage": null,
                "user_ids": ["a"],
                "custom_rules": null
            })
        );
    }
}
