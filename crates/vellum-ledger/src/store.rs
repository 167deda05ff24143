//! Ledger Store: append-only persistence with secondary indexes.
//!
//! There is no update or delete here. The store holds a read capability and
//! an insert capability and nothing else, so no code path through it can
//! change a committed record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::CommitClock;
use crate::enforcer::{InsertCapability, ReadCapability};
use crate::error::{LedgerError, LedgerResult};
use crate::layout::{self, RECORDS_NS};
use crate::record::{AppendReceipt, AppendRequest, AuditRecord, Origin, RecordId};
use crate::retention::RetentionPolicy;

/// How long one append may wait for and hold the commit slot.
pub(crate) const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct StoreInner {
    reads: ReadCapability,
    inserts: InsertCapability,
    clock: CommitClock,
    policy: Arc<RetentionPolicy>,
    max_metadata_bytes: usize,
    commit_timeout: Duration,
}

/// Cheap to clone; clones share one commit clock.
#[derive(Debug, Clone)]
pub(crate) struct LedgerStore {
    inner: Arc<StoreInner>,
}

impl LedgerStore {
    pub(crate) fn new(
        reads: ReadCapability,
        inserts: InsertCapability,
        policy: Arc<RetentionPolicy>,
        max_metadata_bytes: usize,
        commit_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                reads,
                inserts,
                clock: CommitClock::new(),
                policy,
                max_metadata_bytes,
                commit_timeout,
            }),
        }
    }

    pub(crate) fn reads(&self) -> &ReadCapability {
        &self.inner.reads
    }

    pub(crate) fn policy(&self) -> &RetentionPolicy {
        &self.inner.policy
    }

    /// Validate, stamp and commit `request`.
    ///
    /// `Origin::Ledger` is reserved for the ledger's own events (tamper
    /// records, cross-tenant query records).
    pub(crate) async fn append(
        &self,
        request: AppendRequest,
        origin: Origin,
    ) -> LedgerResult<AppendReceipt> {
        request.validate(self.inner.max_metadata_bytes, origin)?;

        let timeout = self.inner.commit_timeout;
        let record = tokio::time::timeout(timeout, self.commit(request))
            .await
            .map_err(|_| {
                warn!(timeout_ms = %timeout.as_millis(), "append timed out");
                LedgerError::StoreUnavailable(format!(
                    "commit did not complete within {} ms",
                    timeout.as_millis()
                ))
            })??;

        debug!(
            record_id = %record.id,
            tenant_id = %record.tenant_id,
            action_type = %record.action_type,
            recorded_at = %record.recorded_at,
            retention_until = %record.retention_until,
            "record committed"
        );
        Ok(AppendReceipt::from(&record))
    }

    /// Stamp and write one record while holding the commit slot, so
    /// `recorded_at` order is commit order.
    async fn commit(&self, request: AppendRequest) -> LedgerResult<AuditRecord> {
        let mut slot = self.inner.clock.slot().await;
        let recorded_at = slot.stamp();
        let retention_until = self
            .inner
            .policy
            .retention_until(&request.action_type, recorded_at)?;

        let AppendRequest {
            actor_id,
            tenant_id,
            occurred_at,
            action_type,
            resource_id,
            metadata,
        } = request;
        let record = AuditRecord {
            id: RecordId::new(),
            actor_id,
            tenant_id,
            occurred_at,
            action_type,
            resource_id,
            metadata,
            retention_until,
            recorded_at,
        };

        let entries = layout::entries_for(&record)?;
        self.inner.inserts.insert_batch(entries).await.map_err(|e| {
            warn!(record_id = %record.id, error = %e, "append failed");
            // A fresh v4 id cannot collide; any refusal here is infrastructure.
            match LedgerError::from(e) {
                LedgerError::ConstraintViolation(msg) => LedgerError::StoreUnavailable(msg),
                other => other,
            }
        })?;
        drop(slot);
        Ok(record)
    }

    pub(crate) async fn get(&self, id: &RecordId) -> LedgerResult<AuditRecord> {
        let bytes = self
            .inner
            .reads
            .get(RECORDS_NS, &id.to_string())
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub(crate) async fn count(&self) -> LedgerResult<usize> {
        Ok(self.inner.reads.list_keys(RECORDS_NS).await?.len())
    }

    pub(crate) async fn close(&self) -> LedgerResult<()> {
        let _slot = self.inner.clock.slot().await;
        Ok(self.inner.reads.close().await?)
    }
}
