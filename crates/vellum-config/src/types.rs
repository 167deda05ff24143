//! Configuration types for the vellum ledger.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal vellum crates. Domain types (retention periods, storage handles)
//! are built from these at the boundary. Every struct implements [`Default`]
//! so that a bare `[section]` header in TOML produces a working
//! configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for a vellum ledger instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend selection.
    pub storage: StorageSection,
    /// Versioned retention policy table.
    pub retention: RetentionSection,
    /// Query bounds and cross-tenant auditing.
    pub query: QuerySection,
    /// Append-path limits.
    pub append: AppendSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Which storage engine backs the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, non-durable. Tests and ephemeral ledgers only.
    #[default]
    Memory,
    /// Embedded `SurrealKV` on local disk.
    Surrealkv,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Surrealkv => write!(f, "surrealkv"),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend to open.
    pub backend: StorageBackend,
    /// Data directory. Required for `surrealkv`.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// One prefix → period entry of the retention policy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRuleSection {
    /// Dot-namespaced action-type prefix (e.g. `"billing"` or `"auth.login"`).
    pub prefix: String,
    /// Minimum holding period, `"<n>y"`, `"<n>m"` or `"<n>d"`.
    pub period: String,
}

/// Versioned retention policy table.
///
/// Loaded once at startup and never reloaded by a running ledger. The floor
/// for tampering evidence is compiled into the ledger and is not
/// configurable here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// Policy version label, recorded in logs alongside every append.
    pub version: String,
    /// Period applied when no rule matches.
    pub baseline: String,
    /// Prefix rules; the longest matching prefix wins.
    pub rules: Vec<RetentionRuleSection>,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            version: "2026-01".to_owned(),
            baseline: "7y".to_owned(),
            rules: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Query facade bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    /// Largest page size a caller may request.
    pub max_limit: usize,
    /// Record an `audit.query.cross_tenant` event for every cross-tenant query.
    pub audit_cross_tenant: bool,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            audit_cross_tenant: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

/// Append-path limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppendSection {
    /// Maximum serialized size of a record's metadata payload.
    pub max_metadata_bytes: usize,
    /// How long one commit may hold the commit slot before the append fails
    /// as unavailable, in milliseconds.
    pub commit_timeout_ms: u64,
}

impl Default for AppendSection {
    fn default() -> Self {
        Self {
            max_metadata_bytes: 65_536,
            commit_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default level filter (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`, `full`).
    pub format: String,
    /// Extra `tracing` directives, e.g. `vellum_ledger=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
