//! Prelude module - commonly used types for convenient import.
//!
//! Use `use vellum_ledger::prelude::*;` to import all essential types.

// Errors
pub use crate::{LedgerError, LedgerResult};

// Records
pub use crate::{AppendReceipt, AppendRequest, AuditRecord, RecordId, TenantId, actions};

// Ledger
pub use crate::{Ledger, LedgerBuilder, LedgerSettings};

// Queries
pub use crate::{CrossTenantGrant, LedgerQuery, PurgeCandidate, QueryPage, QueryScope, TimeRange};

// Retention
pub use crate::{RetentionPeriod, RetentionPolicy, RetentionRule};

// Immutability
pub use crate::{AccessPath, AlertSink, AttemptContext, MutationAttempt, MutationGate, WormStore};
