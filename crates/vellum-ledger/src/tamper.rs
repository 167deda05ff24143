//! Tamper Recorder: turns refused mutations into ledger records.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::enforcer::MutationAttempt;
use crate::error::{LedgerError, LedgerResult};
use crate::layout::{self, INDEX_NS_PREFIX, RECORDS_NS};
use crate::record::{
    AppendReceipt, AppendRequest, AuditRecord, MAX_IDENTIFIER_LEN, Origin, RecordId, TenantId,
    actions,
};
use crate::store::LedgerStore;

/// Serialized size above which an attempted state is summarized instead of
/// stored.
pub const MAX_ATTEMPTED_STATE_BYTES: usize = 16_384;

/// Out-of-band channel for integrity problems the ledger cannot record in
/// itself.
pub trait AlertSink: Send + Sync {
    /// Called when the tamper record for `attempt` failed to commit.
    fn tamper_record_failed(&self, attempt: &MutationAttempt, error: &LedgerError);

    /// Called when a query meets an index entry whose record is missing.
    /// The entry is skipped.
    fn dangling_index_entry(&self, namespace: &str, key: &str) {
        error!(
            target: "vellum::alert",
            namespace,
            key,
            "index entry points at a missing record"
        );
    }
}

/// Default sink: an `error!` event on the `vellum::alert` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn tamper_record_failed(&self, attempt: &MutationAttempt, error: &LedgerError) {
        error!(
            target: "vellum::alert",
            operation = %attempt.kind(),
            namespace = %attempt.namespace(),
            key = %attempt.key(),
            actor_id = %attempt.context().actor_id(),
            access_path = %attempt.context().access_path(),
            %error,
            "tamper attempt could not be recorded"
        );
    }
}

#[derive(Clone)]
pub(crate) struct TamperRecorder {
    store: LedgerStore,
    alerts: Arc<dyn AlertSink>,
}

impl TamperRecorder {
    pub(crate) fn new(store: LedgerStore, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    /// Record `attempt`; on failure alert instead. Never fails.
    pub(crate) async fn record_or_alert(&self, attempt: &MutationAttempt) {
        match self.record(attempt).await {
            Ok(receipt) => info!(
                record_id = %receipt.record_id,
                operation = %attempt.kind(),
                actor_id = %attempt.context().actor_id(),
                "tampering attempt recorded"
            ),
            Err(e) => self.alerts.tamper_record_failed(attempt, &e),
        }
    }

    /// The tamper record goes to the targeted record's tenant when the target
    /// exists, else to the attempt context's tenant, else to `system`.
    pub(crate) async fn record(&self, attempt: &MutationAttempt) -> LedgerResult<AppendReceipt> {
        let target = target_of(attempt);
        let before = match target {
            Some(id) => match self.store.get(&id).await {
                Ok(record) => Some(record),
                Err(LedgerError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let context = attempt.context();
        let tenant_id = before
            .as_ref()
            .map(|r| r.tenant_id.clone())
            .or_else(|| context.tenant_id().cloned())
            .unwrap_or_else(TenantId::system);
        let resource_id = target.map_or_else(
            || sanitize_resource(&format!("{}/{}", attempt.namespace(), attempt.key())),
            |id| id.to_string(),
        );

        let mut metadata = Map::new();
        metadata.insert("operation".into(), Value::String(attempt.kind().to_string()));
        metadata.insert("before_state".into(), before_state(before.as_ref())?);
        metadata.insert(
            "attempted_state".into(),
            attempted_state(attempt.attempted_state())?,
        );
        metadata.insert(
            "access_path".into(),
            Value::String(context.access_path().to_string()),
        );
        metadata.insert("namespace".into(), Value::String(attempt.namespace().to_owned()));
        metadata.insert("key".into(), Value::String(attempt.key().to_owned()));
        metadata.insert(
            "attempted_by_tenant".into(),
            context
                .tenant_id()
                .map_or(Value::Null, |t| Value::String(t.to_string())),
        );

        let request = AppendRequest::new(context.actor_id(), tenant_id, actions::TAMPERING_ATTEMPT)
            .resource(resource_id)
            .with_metadata(metadata);
        self.store.append(request, Origin::Ledger).await
    }
}

impl std::fmt::Debug for TamperRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TamperRecorder").finish_non_exhaustive()
    }
}

/// The record an attempt was aimed at, when the key identifies one.
fn target_of(attempt: &MutationAttempt) -> Option<RecordId> {
    let ns = attempt.namespace();
    if ns == RECORDS_NS {
        RecordId::parse(attempt.key()).ok()
    } else if ns.starts_with(INDEX_NS_PREFIX) {
        layout::record_id_of_index_key(attempt.key())
    } else {
        None
    }
}

fn before_state(record: Option<&AuditRecord>) -> LedgerResult<Value> {
    Ok(match record {
        Some(r) => serde_json::to_value(r)?,
        None => Value::Null,
    })
}

fn attempted_state(value: Option<&Value>) -> LedgerResult<Value> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    let size = serde_json::to_vec(value)?.len();
    if size > MAX_ATTEMPTED_STATE_BYTES {
        return Ok(json!({ "omitted": true, "size_bytes": size }));
    }
    Ok(value.clone())
}

/// Control characters replaced, cut to a valid identifier length on a char
/// boundary.
fn sanitize_resource(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_IDENTIFIER_LEN));
    for c in raw.chars() {
        let c = if c.is_control() { '?' } else { c };
        if out.len().saturating_add(c.len_utf8()) > MAX_IDENTIFIER_LEN {
            break;
        }
        out.push(c);
    }
    out
}
