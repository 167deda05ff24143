//! Immutability Enforcer.
//!
//! Access to the storage engine is split into two disjoint capability sets:
//!
//! - **Insert**: [`InsertCapability`] (plus [`ReadCapability`] for reads) is
//!   the only way anything in this crate writes to the engine. It can create
//!   keys and nothing else. The Ledger Store and the Tamper Recorder hold
//!   only these.
//! - **Mutate/delete**: [`MutationGate`] is the only thing an update or
//!   delete can reach, and every call to it is refused. Before refusing it
//!   synchronously hands the attempt to the Tamper Recorder, whose append
//!   goes through the insert capability and therefore can never land back
//!   in the gate.
//!
//! [`WormStore`] puts the gate in front of the engine for direct, low-level
//! access. It implements [`KvStore`], so code that expects a plain key/value
//! store can be given one and still cannot change committed data. It cannot
//! add to the ledger's own namespaces either: records and index entries are
//! only ever written by the append path.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, warn};
use vellum_storage::{KvEntry, KvStore, StorageError, StorageResult};
use vellum_telemetry::OperationContext;

use crate::error::{LedgerError, LedgerResult};
use crate::layout::{RECORDS_NS, is_ledger_namespace};
use crate::record::{RecordId, TenantId, validate_identifier};
use crate::tamper::TamperRecorder;

/// Split a raw engine handle into the read and insert capabilities.
pub(crate) fn capabilities(engine: Arc<dyn KvStore>) -> (ReadCapability, InsertCapability) {
    (
        ReadCapability {
            engine: Arc::clone(&engine),
        },
        InsertCapability { engine },
    )
}

/// Read-only view of the engine.
#[derive(Clone)]
pub(crate) struct ReadCapability {
    engine: Arc<dyn KvStore>,
}

impl ReadCapability {
    pub(crate) async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.engine.get(namespace, key).await
    }

    pub(crate) async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.engine.exists(namespace, key).await
    }

    pub(crate) async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.engine.list_keys(namespace).await
    }

    pub(crate) async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>> {
        self.engine.range(namespace, start, end, limit).await
    }

    /// Flush and release the engine.
    pub(crate) async fn close(&self) -> StorageResult<()> {
        self.engine.close().await
    }
}

impl fmt::Debug for ReadCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCapability").finish_non_exhaustive()
    }
}

/// Create-only view of the engine.
#[derive(Clone)]
pub(crate) struct InsertCapability {
    engine: Arc<dyn KvStore>,
}

impl InsertCapability {
    /// Create every entry or none. Existing keys are never touched.
    pub(crate) async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()> {
        self.engine.insert_batch(entries).await
    }
}

impl fmt::Debug for InsertCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertCapability").finish_non_exhaustive()
    }
}

/// How a mutation attempt reached the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPath {
    /// Through the [`Ledger`](crate::Ledger) facade.
    Facade,
    /// Through a raw key/value handle ([`WormStore`]).
    Storage,
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Facade => f.write_str("facade"),
            Self::Storage => f.write_str("storage"),
        }
    }
}

/// Who is acting, on behalf of which tenant, through which path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptContext {
    actor_id: String,
    tenant_id: Option<TenantId>,
    access_path: AccessPath,
}

impl AttemptContext {
    /// Create a context for `actor_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if the actor id is
    /// empty, too long, or contains control characters.
    pub fn new(actor_id: impl Into<String>, access_path: AccessPath) -> LedgerResult<Self> {
        let actor_id = actor_id.into();
        validate_identifier("actor_id", &actor_id).map_err(LedgerError::ConstraintViolation)?;
        Ok(Self {
            actor_id,
            tenant_id: None,
            access_path,
        })
    }

    /// Set the tenant the actor is acting for.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Acting actor.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Tenant the actor is acting for, if known.
    #[must_use]
    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    /// Access path.
    #[must_use]
    pub fn access_path(&self) -> AccessPath {
        self.access_path
    }
}

/// Kind of forbidden operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    /// Direct write of a record or index entry, bypassing the append path.
    Insert,
    /// Overwrite of committed data.
    Update,
    /// Removal of committed data.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A refused insert, update or delete, as handed to the Tamper Recorder and to
/// [`AlertSink`](crate::AlertSink)s.
#[derive(Debug, Clone)]
pub struct MutationAttempt {
    kind: MutationKind,
    namespace: String,
    key: String,
    attempted_state: Option<Value>,
    context: AttemptContext,
}

impl MutationAttempt {
    pub(crate) fn new(
        kind: MutationKind,
        namespace: impl Into<String>,
        key: impl Into<String>,
        attempted_state: Option<Value>,
        context: AttemptContext,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            key: key.into(),
            attempted_state,
            context,
        }
    }

    /// Insert, update or delete.
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Targeted namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Targeted key (`*` for a whole-namespace clear).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value the caller tried to write, for inserts and updates.
    #[must_use]
    pub fn attempted_state(&self) -> Option<&Value> {
        self.attempted_state.as_ref()
    }

    /// Who tried.
    #[must_use]
    pub fn context(&self) -> &AttemptContext {
        &self.context
    }
}

/// The always-refusing mutation path.
///
/// Stateless: each call is judged on its own and the answer is always
/// [`LedgerError::ImmutabilityViolation`]. The tamper record is written
/// (or its failure alerted) before the call returns.
#[derive(Clone)]
pub struct MutationGate {
    recorder: TamperRecorder,
}

impl MutationGate {
    pub(crate) fn new(recorder: TamperRecorder) -> Self {
        Self { recorder }
    }

    /// Refuse an update of `record_id`. Always returns
    /// [`LedgerError::ImmutabilityViolation`].
    pub async fn reject_update(
        &self,
        context: &AttemptContext,
        record_id: &RecordId,
        attempted_state: Value,
    ) -> LedgerError {
        self.reject(MutationAttempt::new(
            MutationKind::Update,
            RECORDS_NS,
            record_id.to_string(),
            Some(attempted_state),
            context.clone(),
        ))
        .await
    }

    /// Refuse a delete of `record_id`. Always returns
    /// [`LedgerError::ImmutabilityViolation`].
    pub async fn reject_delete(&self, context: &AttemptContext, record_id: &RecordId) -> LedgerError {
        self.reject(MutationAttempt::new(
            MutationKind::Delete,
            RECORDS_NS,
            record_id.to_string(),
            None,
            context.clone(),
        ))
        .await
    }

    pub(crate) async fn reject(&self, attempt: MutationAttempt) -> LedgerError {
        let span = OperationContext::new("enforcer")
            .with_operation(attempt.kind.to_string())
            .with_actor(attempt.context.actor_id())
            .span();

        async {
            warn!(
                operation = %attempt.kind,
                namespace = %attempt.namespace,
                key = %attempt.key,
                actor_id = %attempt.context.actor_id,
                access_path = %attempt.context.access_path,
                "write to ledger data rejected"
            );
            self.recorder.record_or_alert(&attempt).await;
        }
        .instrument(span)
        .await;

        LedgerError::ImmutabilityViolation(format!(
            "{} of {}/{} is not permitted",
            attempt.kind, attempt.namespace, attempt.key
        ))
    }
}

impl fmt::Debug for MutationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationGate").finish_non_exhaustive()
    }
}

/// Write-once [`KvStore`] in front of the ledger's storage engine.
///
/// Reads pass through. Writes to absent keys outside the `ledger:`
/// namespaces are inserts. Any write into a `ledger:` namespace, and every
/// overwrite, delete and namespace clear, is refused with
/// [`StorageError::Immutable`] after the attempt has been recorded; the
/// engine never sees it.
#[derive(Clone)]
pub struct WormStore {
    reads: ReadCapability,
    inserts: InsertCapability,
    gate: MutationGate,
    context: AttemptContext,
}

impl WormStore {
    pub(crate) fn new(
        reads: ReadCapability,
        inserts: InsertCapability,
        gate: MutationGate,
        context: AttemptContext,
    ) -> Self {
        Self {
            reads,
            inserts,
            gate,
            context,
        }
    }

    /// The context every refused attempt through this handle is recorded
    /// under.
    #[must_use]
    pub fn context(&self) -> &AttemptContext {
        &self.context
    }

    async fn refuse(
        &self,
        kind: MutationKind,
        namespace: &str,
        key: &str,
        attempted_state: Option<Value>,
    ) -> StorageError {
        let err = self
            .gate
            .reject(MutationAttempt::new(
                kind,
                namespace,
                key,
                attempted_state,
                self.context.clone(),
            ))
            .await;
        StorageError::Immutable(err.to_string())
    }
}

impl fmt::Debug for WormStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WormStore")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Attempted bytes as JSON when they are JSON, base64 otherwise.
fn attempted_value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(STANDARD.encode(bytes)))
}

#[async_trait]
impl KvStore for WormStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.reads.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let attempted = attempted_value(&value);
        if is_ledger_namespace(namespace) {
            let kind = if self.reads.exists(namespace, key).await? {
                MutationKind::Update
            } else {
                MutationKind::Insert
            };
            return Err(self.refuse(kind, namespace, key, Some(attempted)).await);
        }
        match self
            .inserts
            .insert_batch(vec![KvEntry::new(namespace, key, value)])
            .await
        {
            Err(StorageError::AlreadyExists(_)) => Err(self
                .refuse(MutationKind::Update, namespace, key, Some(attempted))
                .await),
            other => other,
        }
    }

    async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()> {
        // One tamper record per forged entry; the whole batch is refused.
        let mut refusal = None;
        for entry in entries.iter().filter(|e| is_ledger_namespace(&e.namespace)) {
            let err = self
                .refuse(
                    MutationKind::Insert,
                    &entry.namespace,
                    &entry.key,
                    Some(attempted_value(&entry.value)),
                )
                .await;
            refusal = refusal.or(Some(err));
        }
        match refusal {
            Some(err) => Err(err),
            None => self.inserts.insert_batch(entries).await,
        }
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Err(self.refuse(MutationKind::Delete, namespace, key, None).await)
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.reads.exists(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.reads.list_keys(namespace).await
    }

    async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>> {
        self.reads.range(namespace, start, end, limit).await
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        Err(self.refuse(MutationKind::Delete, namespace, "*", None).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_context_validates_actor() {
        assert!(AttemptContext::new("", AccessPath::Storage).is_err());
        assert!(AttemptContext::new("dba\u{7}", AccessPath::Storage).is_err());
        let ctx = AttemptContext::new("dba", AccessPath::Storage)
            .unwrap()
            .with_tenant(TenantId::new("acme").unwrap());
        assert_eq!(ctx.actor_id(), "dba");
        assert_eq!(ctx.tenant_id().map(TenantId::as_str), Some("acme"));
        assert_eq!(ctx.access_path(), AccessPath::Storage);
    }

    #[test]
    fn test_attempted_value_decoding() {
        assert_eq!(attempted_value(br#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(
            attempted_value(&[0xff, 0x00]),
            Value::String(STANDARD.encode([0xff, 0x00]))
        );
    }

    #[test]
    fn test_kinds_and_paths_render_lowercase() {
        assert_eq!(MutationKind::Delete.to_string(), "delete");
        assert_eq!(MutationKind::Insert.to_string(), "insert");
        assert_eq!(
            serde_json::to_value(AccessPath::Facade).unwrap(),
            Value::String("facade".into())
        );
    }
}
