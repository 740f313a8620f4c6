//! Rule Set & Key Namer (spec §4.3).

use serde::Serialize;

use crate::config::RuleSpec;
use crate::error::RateLimitError;

/// A single `(interval, limit, precision?)` rule. Immutable after
/// construction. `precision` is kept as given (not clamped) so the
/// whole rule set can be re-serialized verbatim — clamping happens
/// logically wherever the effective value is needed, via
/// [`Rule::effective_precision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    interval: u64,
    limit: u64,
    precision: Option<u64>,
}

impl Rule {
    /// Validate and construct a rule. `interval` and `limit` must be
    /// positive; `precision`, if given, must be positive too (clamping
    /// against `interval` happens lazily, not here).
    pub fn new(interval: u64, limit: u64, precision: Option<u64>) -> Result<Self, RateLimitError> {
        if interval == 0 {
            return Err(RateLimitError::ConfigError(
                "rule interval must be a positive integer".into(),
            ));
        }
        if limit == 0 {
            return Err(RateLimitError::ConfigError(
                "rule limit must be a positive integer".into(),
            ));
        }
        if let Some(p) = precision {
            if p == 0 {
                return Err(RateLimitError::ConfigError(
                    "rule precision must be a positive integer".into(),
                ));
            }
        }
        Ok(Self {
            interval,
            limit,
            precision,
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The raw configured precision, before clamping.
    pub fn raw_precision(&self) -> Option<u64> {
        self.precision
    }

    /// `min(precision.unwrap_or(interval), interval)` — the value
    /// actually used to name bucket fields.
    pub fn effective_precision(&self) -> u64 {
        self.precision.map(|p| p.min(self.interval)).unwrap_or(self.interval)
    }

    /// The cumulative-count field name for this rule: `"<interval>:<precision>:"`.
    pub fn count_field(&self) -> String {
        format!("{}:{}:", self.interval, self.effective_precision())
    }
}

impl Serialize for Rule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(if self.precision.is_some() { 3 } else { 2 }))?;
        seq.serialize_element(&self.interval)?;
        seq.serialize_element(&self.limit)?;
        if let Some(p) = self.precision {
            seq.serialize_element(&p)?;
        }
        seq.end()
    }
}

/// Ordered, validated list of rules plus their JSON wire encoding.
#[derive(Debug, Clone)]
pub struct RuleSet(Vec<Rule>);

impl RuleSet {
    /// Validate and normalize the configured rules. Requires at least
    /// one rule (spec §6: "rules: required non-empty list").
    pub fn try_new(specs: Vec<RuleSpec>) -> Result<Self, RateLimitError> {
        if specs.is_empty() {
            return Err(RateLimitError::ConfigError(
                "rule set must contain at least one rule".into(),
            ));
        }
        let rules = specs
            .into_iter()
            .map(|s| Rule::new(s.interval_seconds, s.limit, s.precision_seconds))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(rules))
    }

    /// Serialize as a JSON array of arrays of numbers, numeric (not
    /// quoted), suitable for `args[0]` of the atomic scripts.
    pub fn rules_json(&self) -> String {
        serde_json::to_string(&self.0).expect("Rule serialization is infallible")
    }

    /// The largest configured interval, used as the counter hash's TTL.
    pub fn max_interval(&self) -> u64 {
        self.0
            .iter()
            .map(Rule::interval)
            .max()
            .expect("RuleSet is never empty")
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_interval_or_limit() {
        assert!(Rule::new(0, 5, None).is_err());
        assert!(Rule::new(5, 0, None).is_err());
        assert!(Rule::new(5, 5, Some(0)).is_err());
    }

    #[test]
    fn effective_precision_clamps_but_raw_is_preserved() {
        let r = Rule::new(10, 5, Some(100)).unwrap();
        assert_eq!(r.raw_precision(), Some(100));
        assert_eq!(r.effective_precision(), 10);
    }

    #[test]
    fn precision_defaults_to_interval() {
        let r = Rule::new(10, 5, None).unwrap();
        assert_eq!(r.effective_precision(), 10);
    }

    #[test]
    fn serializes_as_numeric_array_re_serializable_verbatim() {
        let rules = RuleSet::try_new(vec![
            RuleSpec { interval_seconds: 1, limit: 5, precision_seconds: None },
            RuleSpec { interval_seconds: 3600, limit: 1000, precision_seconds: Some(100) },
        ])
        .unwrap();
        assert_eq!(rules.rules_json(), r#"[[1,5],[3600,1000,100]]"#);
    }

    #[test]
    fn empty_rule_list_is_a_config_error() {
        assert!(RuleSet::try_new(vec![]).is_err());
    }

    #[test]
    fn max_interval_picks_the_largest_rule() {
        let rules = RuleSet::try_new(vec![
            RuleSpec { interval_seconds: 1, limit: 5, precision_seconds: None },
            RuleSpec { interval_seconds: 3600, limit: 1000, precision_seconds: Some(100) },
        ])
        .unwrap();
        assert_eq!(rules.max_interval(), 3600);
    }
}
