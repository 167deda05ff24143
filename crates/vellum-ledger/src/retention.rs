//! Retention Calculator.
//!
//! Maps an action type, through an immutable and versioned policy table, to
//! the earliest instant a record may be purged. The horizon is always
//! measured from the commit time (`recorded_at`), never from the
//! caller-asserted `occurred_at`.
//!
//! Tampering evidence has a compiled-in floor ([`TAMPERING_FLOOR`]). The
//! configured table can lengthen its retention but never shorten it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vellum_config::RetentionSection;

use crate::error::{LedgerError, LedgerResult};
use crate::record::actions;

/// Minimum holding period for `audit.tampering.attempt` records.
pub const TAMPERING_FLOOR: RetentionPeriod = RetentionPeriod::Years(10);

/// A calendar holding period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RetentionPeriod {
    /// Calendar years.
    Years(u32),
    /// Calendar months.
    Months(u32),
    /// Days.
    Days(u32),
}

impl RetentionPeriod {
    fn amount(self) -> u32 {
        match self {
            Self::Years(n) | Self::Months(n) | Self::Days(n) => n,
        }
    }

    /// The instant `self` after `from`.
    ///
    /// Month arithmetic clamps to the end of shorter months (Jan 31 + 1m is
    /// the last day of February).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if the result is out of
    /// the representable range.
    pub fn after(self, from: DateTime<Utc>) -> LedgerResult<DateTime<Utc>> {
        let result = match self {
            Self::Years(n) => n
                .checked_mul(12)
                .and_then(|months| from.checked_add_months(Months::new(months))),
            Self::Months(n) => from.checked_add_months(Months::new(n)),
            Self::Days(n) => from.checked_add_days(Days::new(u64::from(n))),
        };
        result.ok_or_else(|| {
            LedgerError::ConstraintViolation(format!(
                "retention horizon {self} after {from} is out of range"
            ))
        })
    }
}

impl FromStr for RetentionPeriod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            LedgerError::ConstraintViolation(format!(
                "invalid retention period '{s}'; expected '<n>y', '<n>m' or '<n>d'"
            ))
        };
        let (amount, unit) = s.split_at_checked(s.len().saturating_sub(1)).ok_or_else(invalid)?;
        let n: u32 = amount.parse().map_err(|_| invalid())?;
        match unit {
            "y" => Ok(Self::Years(n)),
            "m" => Ok(Self::Months(n)),
            "d" => Ok(Self::Days(n)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for RetentionPeriod {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RetentionPeriod> for String {
    fn from(p: RetentionPeriod) -> Self {
        p.to_string()
    }
}

impl fmt::Display for RetentionPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Years(n) => write!(f, "{n}y"),
            Self::Months(n) => write!(f, "{n}m"),
            Self::Days(n) => write!(f, "{n}d"),
        }
    }
}

/// One prefix → period entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRule {
    prefix: String,
    period: RetentionPeriod,
}

impl RetentionRule {
    /// Create a rule. Checked when the policy is built.
    #[must_use]
    pub fn new(prefix: impl Into<String>, period: RetentionPeriod) -> Self {
        Self {
            prefix: prefix.into(),
            period,
        }
    }

    /// Whether `action_type` equals the prefix or extends it by whole
    /// segments.
    fn matches(&self, action_type: &str) -> bool {
        action_type
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }
}

/// Immutable, versioned retention policy.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    version: String,
    baseline: RetentionPeriod,
    rules: Vec<RetentionRule>,
}

impl RetentionPolicy {
    /// Build a policy.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] for an empty version, a
    /// zero-length period, a malformed prefix, or a duplicate prefix.
    pub fn new(
        version: impl Into<String>,
        baseline: RetentionPeriod,
        rules: Vec<RetentionRule>,
    ) -> LedgerResult<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(LedgerError::ConstraintViolation(
                "retention policy version must not be empty".to_owned(),
            ));
        }
        check_non_zero(baseline)?;
        for (i, rule) in rules.iter().enumerate() {
            check_non_zero(rule.period)?;
            if !is_segment_prefix(&rule.prefix) {
                return Err(LedgerError::ConstraintViolation(format!(
                    "retention rule prefix '{}' is not dot-separated [a-z0-9_-] segments",
                    rule.prefix
                )));
            }
            if rules[..i].iter().any(|r| r.prefix == rule.prefix) {
                return Err(LedgerError::ConstraintViolation(format!(
                    "duplicate retention rule for prefix '{}'",
                    rule.prefix
                )));
            }
        }
        Ok(Self {
            version,
            baseline,
            rules,
        })
    }

    /// Build a policy from the `[retention]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if any period or prefix
    /// is invalid.
    pub fn from_config(section: &RetentionSection) -> LedgerResult<Self> {
        let rules = section
            .rules
            .iter()
            .map(|r| -> LedgerResult<RetentionRule> {
                Ok(RetentionRule::new(r.prefix.clone(), r.period.parse()?))
            })
            .collect::<LedgerResult<Vec<_>>>()?;
        Self::new(section.version.clone(), section.baseline.parse()?, rules)
    }

    /// Policy version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Period applied when no rule matches.
    #[must_use]
    pub fn baseline(&self) -> RetentionPeriod {
        self.baseline
    }

    /// The configured period for `action_type`: the longest matching prefix
    /// rule, or the baseline. Does not include the tampering floor.
    #[must_use]
    pub fn period_for(&self, action_type: &str) -> RetentionPeriod {
        self.rules
            .iter()
            .filter(|r| r.matches(action_type))
            .max_by_key(|r| r.prefix.len())
            .map_or(self.baseline, |r| r.period)
    }

    /// Retention horizon for a record of `action_type` committed at
    /// `recorded_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if the horizon overflows.
    pub fn retention_until(
        &self,
        action_type: &str,
        recorded_at: DateTime<Utc>,
    ) -> LedgerResult<DateTime<Utc>> {
        let period = self.period_for(action_type);
        let mut until = period.after(recorded_at)?;
        if action_type == actions::TAMPERING_ATTEMPT {
            until = until.max(TAMPERING_FLOOR.after(recorded_at)?);
        }
        debug!(
            action_type,
            %period,
            policy_version = %self.version,
            %until,
            "computed retention horizon"
        );
        Ok(until)
    }
}

impl Default for RetentionPolicy {
    /// Seven-year baseline, no rules.
    fn default() -> Self {
        Self {
            version: "default".to_owned(),
            baseline: RetentionPeriod::Years(7),
            rules: Vec::new(),
        }
    }
}

fn check_non_zero(period: RetentionPeriod) -> LedgerResult<()> {
    if period.amount() == 0 {
        return Err(LedgerError::ConstraintViolation(format!(
            "retention period '{period}' must be longer than zero"
        )));
    }
    Ok(())
}

fn is_segment_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.split('.').all(|s| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vellum_config::RetentionRuleSection;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(
            "test-1",
            RetentionPeriod::Years(7),
            vec![
                RetentionRule::new("auth", RetentionPeriod::Years(2)),
                RetentionRule::new("auth.login", RetentionPeriod::Months(18)),
                RetentionRule::new("billing", RetentionPeriod::Years(10)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_periods() {
        assert_eq!("7y".parse::<RetentionPeriod>().unwrap(), RetentionPeriod::Years(7));
        assert_eq!("18m".parse::<RetentionPeriod>().unwrap(), RetentionPeriod::Months(18));
        assert_eq!("90d".parse::<RetentionPeriod>().unwrap(), RetentionPeriod::Days(90));
        assert!("7w".parse::<RetentionPeriod>().is_err());
        assert!("".parse::<RetentionPeriod>().is_err());
        assert!("y".parse::<RetentionPeriod>().is_err());
        assert!("-1y".parse::<RetentionPeriod>().is_err());
        assert!("7é".parse::<RetentionPeriod>().is_err());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let p = policy();
        assert_eq!(p.period_for("auth.login.failed"), RetentionPeriod::Months(18));
        assert_eq!(p.period_for("auth.logout"), RetentionPeriod::Years(2));
        assert_eq!(p.period_for("billing.invoice.void"), RetentionPeriod::Years(10));
        assert_eq!(p.period_for("storage.bucket.create"), RetentionPeriod::Years(7));
    }

    #[test]
    fn test_prefix_matches_whole_segments_only() {
        let p = policy();
        // "authz" must not match the "auth" rule.
        assert_eq!(p.period_for("authz.grant"), RetentionPeriod::Years(7));
    }

    #[test]
    fn test_horizon_is_measured_from_commit_time() {
        let p = policy();
        let recorded = at(2026, 3, 1);
        assert_eq!(
            p.retention_until("storage.bucket.create", recorded).unwrap(),
            at(2033, 3, 1)
        );
        assert_eq!(
            p.retention_until("auth.login.failed", recorded).unwrap(),
            at(2027, 9, 1)
        );
    }

    #[test]
    fn test_tampering_floor_cannot_be_shortened() {
        let p = RetentionPolicy::new(
            "hostile",
            RetentionPeriod::Days(1),
            vec![RetentionRule::new("audit", RetentionPeriod::Days(1))],
        )
        .unwrap();
        let recorded = at(2026, 1, 15);
        assert_eq!(
            p.retention_until(actions::TAMPERING_ATTEMPT, recorded).unwrap(),
            at(2036, 1, 15)
        );
    }

    #[test]
    fn test_tampering_floor_can_be_lengthened() {
        let p = RetentionPolicy::new(
            "strict",
            RetentionPeriod::Years(7),
            vec![RetentionRule::new("audit.tampering", RetentionPeriod::Years(25))],
        )
        .unwrap();
        let recorded = at(2026, 1, 15);
        assert_eq!(
            p.retention_until(actions::TAMPERING_ATTEMPT, recorded).unwrap(),
            at(2051, 1, 15)
        );
    }

    #[test]
    fn test_month_arithmetic_clamps() {
        let jan31 = at(2026, 1, 31);
        assert_eq!(RetentionPeriod::Months(1).after(jan31).unwrap(), at(2026, 2, 28));
    }

    #[test]
    fn test_overflow_is_constraint_violation() {
        let err = RetentionPeriod::Years(u32::MAX).after(at(2026, 1, 1)).unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
    }

    #[test]
    fn test_policy_rejects_zero_and_duplicates() {
        assert!(RetentionPolicy::new("v", RetentionPeriod::Days(0), vec![]).is_err());
        assert!(
            RetentionPolicy::new(
                "v",
                RetentionPeriod::Years(1),
                vec![RetentionRule::new("auth", RetentionPeriod::Months(0))]
            )
            .is_err()
        );
        assert!(
            RetentionPolicy::new(
                "v",
                RetentionPeriod::Years(1),
                vec![
                    RetentionRule::new("auth", RetentionPeriod::Years(1)),
                    RetentionRule::new("auth", RetentionPeriod::Years(2)),
                ]
            )
            .is_err()
        );
        assert!(RetentionPolicy::new("", RetentionPeriod::Years(1), vec![]).is_err());
    }

    #[test]
    fn test_from_config() {
        let section = RetentionSection {
            version: "2026-01".to_owned(),
            baseline: "7y".to_owned(),
            rules: vec![RetentionRuleSection {
                prefix: "billing".to_owned(),
                period: "10y".to_owned(),
            }],
        };
        let p = RetentionPolicy::from_config(&section).unwrap();
        assert_eq!(p.version(), "2026-01");
        assert_eq!(p.baseline(), RetentionPeriod::Years(7));
        assert_eq!(p.period_for("billing.charge"), RetentionPeriod::Years(10));
    }

    #[test]
    fn test_period_serde_as_string() {
        let json = serde_json::to_string(&RetentionPeriod::Months(18)).unwrap();
        assert_eq!(json, "\"18m\"");
        let back: RetentionPeriod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RetentionPeriod::Months(18));
    }
}
