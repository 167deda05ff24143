//! Vellum Ledger - immutable, multi-tenant audit ledger.
//!
//! This crate provides:
//! - Append-only persistence of audit records with secondary indexes
//! - Retention horizons stamped at commit from a versioned policy table
//! - Refusal of every update or delete of committed data
//! - Tamper recording: each refused mutation becomes a ledger record
//! - Tenant-scoped, paginated queries
//!
//! # Security Model
//!
//! The storage engine is split into a create-only capability and a
//! read capability when the ledger is built. The append path and the
//! Tamper Recorder hold only those. Updates and deletes can only reach the
//! [`MutationGate`], which always refuses and records the attempt before
//! returning. The builder takes the engine by value, so direct key/value
//! access exists only as a [`WormStore`], which routes overwrites, deletes
//! and any write into the ledger's own namespaces to the same gate.
//!
//! Records in the reserved `audit.` action namespace and the `system`
//! tenant are written only by the ledger itself.
//!
//! # Example
//!
//! ```
//! use vellum_ledger::{AppendRequest, Ledger, LedgerQuery, TenantId};
//!
//! # async fn run() -> vellum_ledger::LedgerResult<()> {
//! let ledger = Ledger::in_memory();
//! let acme = TenantId::new("acme")?;
//!
//! let receipt = ledger
//!     .append(AppendRequest::new("svc-auth", acme.clone(), "auth.login").resource("user-7"))
//!     .await?;
//! assert!(receipt.retention_until > receipt.recorded_at);
//!
//! let page = ledger.query(&LedgerQuery::tenant(acme).action("auth.login")).await?;
//! assert_eq!(page.records.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod clock;
mod enforcer;
mod error;
mod layout;
mod ledger;
mod query;
mod record;
mod retention;
mod store;
mod tamper;

pub use enforcer::{AccessPath, AttemptContext, MutationAttempt, MutationGate, MutationKind, WormStore};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerBuilder, LedgerSettings};
pub use query::{
    CrossTenantGrant, DEFAULT_QUERY_LIMIT, LedgerQuery, PurgeCandidate, QueryPage, QueryScope,
    TimeRange,
};
pub use record::{
    AppendReceipt, AppendRequest, AuditRecord, MAX_ACTION_TYPE_LEN, MAX_IDENTIFIER_LEN, RecordId,
    TenantId, actions,
};
pub use retention::{RetentionPeriod, RetentionPolicy, RetentionRule, TAMPERING_FLOOR};
pub use tamper::{AlertSink, MAX_ATTEMPTED_STATE_BYTES, TracingAlertSink};
