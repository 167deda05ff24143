//! Post-merge configuration validation.
//!
//! Validates that deserialized [`Config`](crate::Config) values are within
//! acceptable ranges and that cross-field invariants hold.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, StorageBackend};

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_storage(config)?;
    validate_retention(config)?;
    validate_query(config)?;
    validate_append(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let s = &config.storage;
    if s.backend == StorageBackend::Surrealkv && s.path.is_none() {
        return Err(invalid(
            "storage.path",
            "a data directory is required for the surrealkv backend",
        ));
    }
    if let Some(path) = &s.path
        && path.as_os_str().is_empty()
    {
        return Err(invalid("storage.path", "path must not be empty"));
    }
    Ok(())
}

/// Check a `"<n>y" | "<n>m" | "<n>d"` period string without interpreting it.
///
/// The ledger owns the calendar arithmetic; this only rejects strings it
/// could never accept.
pub(crate) fn check_period(period: &str) -> Result<(), String> {
    let Some(unit) = period.chars().last() else {
        return Err("period must not be empty".to_owned());
    };
    if !matches!(unit, 'y' | 'm' | 'd') {
        return Err(format!(
            "period '{period}' must end in 'y', 'm' or 'd'"
        ));
    }
    let amount = &period[..period.len().saturating_sub(1)];
    match amount.parse::<u32>() {
        Ok(0) => Err(format!("period '{period}' must be greater than zero")),
        Ok(_) => Ok(()),
        Err(_) => Err(format!("period '{period}' must start with a whole number")),
    }
}

/// Whether `prefix` is a well-formed dot-namespaced action-type prefix.
fn is_action_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && prefix.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        })
}

fn validate_retention(config: &Config) -> ConfigResult<()> {
    let r = &config.retention;

    if r.version.trim().is_empty() {
        return Err(invalid("retention.version", "policy version must not be empty"));
    }

    check_period(&r.baseline).map_err(|m| invalid("retention.baseline", m))?;

    let mut seen = HashSet::new();
    for (i, rule) in r.rules.iter().enumerate() {
        let field = format!("retention.rules[{i}]");
        if !is_action_prefix(&rule.prefix) {
            return Err(invalid(
                format!("{field}.prefix"),
                format!(
                    "'{}' is not a dot-namespaced prefix of [a-z0-9_-] segments",
                    rule.prefix
                ),
            ));
        }
        if !seen.insert(rule.prefix.as_str()) {
            return Err(invalid(
                format!("{field}.prefix"),
                format!("duplicate rule for prefix '{}'", rule.prefix),
            ));
        }
        check_period(&rule.period).map_err(|m| invalid(format!("{field}.period"), m))?;
    }
    Ok(())
}

/// Upper bound on `query.max_limit`.
const MAX_PAGE_UPPER_BOUND: usize = 10_000;

fn validate_query(config: &Config) -> ConfigResult<()> {
    let q = &config.query;
    if q.max_limit == 0 || q.max_limit > MAX_PAGE_UPPER_BOUND {
        return Err(invalid(
            "query.max_limit",
            format!("max_limit must be between 1 and {MAX_PAGE_UPPER_BOUND}"),
        ));
    }
    Ok(())
}

/// Upper bound on `append.max_metadata_bytes` (1 MiB).
const METADATA_UPPER_BOUND: usize = 1_048_576;

/// Upper bound on `append.commit_timeout_ms` (one minute).
const COMMIT_TIMEOUT_UPPER_BOUND_MS: u64 = 60_000;

fn validate_append(config: &Config) -> ConfigResult<()> {
    let a = &config.append;
    if a.max_metadata_bytes == 0 || a.max_metadata_bytes > METADATA_UPPER_BOUND {
        return Err(invalid(
            "append.max_metadata_bytes",
            format!("max_metadata_bytes must be between 1 and {METADATA_UPPER_BOUND}"),
        ));
    }
    if a.commit_timeout_ms == 0 || a.commit_timeout_ms > COMMIT_TIMEOUT_UPPER_BOUND_MS {
        return Err(invalid(
            "append.commit_timeout_ms",
            format!("commit_timeout_ms must be between 1 and {COMMIT_TIMEOUT_UPPER_BOUND_MS}"),
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json" | "full") {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}
