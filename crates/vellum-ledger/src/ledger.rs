//! The [`Ledger`] facade.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{Instrument, info, warn};
use vellum_config::{Config, StorageBackend};
use vellum_storage::{KvStore, MemoryKvStore};
use vellum_telemetry::OperationContext;

use crate::enforcer::{AttemptContext, InsertCapability, MutationGate, WormStore, capabilities};
use crate::error::{LedgerError, LedgerResult};
use crate::query::{
    CrossTenantGrant, LedgerQuery, PurgeCandidate, QueryFacade, QueryPage, QueryScope,
};
use crate::record::{
    AppendReceipt, AppendRequest, AuditRecord, Origin, RecordId, TenantId, actions,
};
use crate::retention::RetentionPolicy;
use crate::store::{DEFAULT_COMMIT_TIMEOUT, LedgerStore};
use crate::tamper::{AlertSink, TamperRecorder, TracingAlertSink};

/// Runtime limits of a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Largest accepted query page.
    pub max_query_limit: usize,
    /// Record an `audit.query.cross_tenant` event for cross-tenant reads.
    pub audit_cross_tenant: bool,
    /// Maximum serialized metadata size for caller appends.
    pub max_metadata_bytes: usize,
    /// How long an append may wait for and hold the commit slot before it
    /// fails with [`LedgerError::StoreUnavailable`].
    pub commit_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_query_limit: 1000,
            audit_cross_tenant: true,
            max_metadata_bytes: 65_536,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }
}

impl LedgerSettings {
    /// Settings from the `query` and `append` config sections.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_query_limit: config.query.max_limit,
            audit_cross_tenant: config.query.audit_cross_tenant,
            max_metadata_bytes: config.append.max_metadata_bytes,
            commit_timeout: Duration::from_millis(config.append.commit_timeout_ms),
        }
    }
}

/// Builder for [`Ledger`].
#[derive(Default)]
pub struct LedgerBuilder {
    engine: Option<Arc<dyn KvStore>>,
    policy: Option<RetentionPolicy>,
    settings: LedgerSettings,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl LedgerBuilder {
    /// Storage engine. Defaults to a fresh [`MemoryKvStore`].
    ///
    /// Taken by value: the ledger owns the only handle, and
    /// [`Ledger::raw_store`] is the only low-level way back in.
    #[must_use]
    pub fn engine(mut self, engine: impl KvStore + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Retention policy. Defaults to [`RetentionPolicy::default`].
    #[must_use]
    pub fn policy(mut self, policy: RetentionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Runtime limits.
    #[must_use]
    pub fn settings(mut self, settings: LedgerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Where unrecordable tamper attempts are reported. Defaults to
    /// [`TracingAlertSink`].
    #[must_use]
    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Wire the components together.
    #[must_use]
    pub fn build(self) -> Ledger {
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(MemoryKvStore::new()));
        let (reads, inserts) = capabilities(engine);
        let policy = Arc::new(self.policy.unwrap_or_default());

        info!(
            retention_version = policy.version(),
            baseline = %policy.baseline(),
            max_query_limit = self.settings.max_query_limit,
            audit_cross_tenant = self.settings.audit_cross_tenant,
            "ledger ready"
        );

        let store = LedgerStore::new(
            reads,
            inserts.clone(),
            policy,
            self.settings.max_metadata_bytes,
            self.settings.commit_timeout,
        );
        let alerts = self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink));
        let gate = MutationGate::new(TamperRecorder::new(store.clone(), Arc::clone(&alerts)));
        let queries = QueryFacade::new(store.clone(), self.settings.max_query_limit, alerts);

        Ledger {
            store,
            inserts,
            gate,
            queries,
            settings: self.settings,
        }
    }
}

/// Immutable, multi-tenant audit ledger.
///
/// Records can be appended and read. There is no update or delete: the
/// only way to ask for one is the [`MutationGate`] or a [`WormStore`], and
/// both refuse and record the attempt as an `audit.tampering.attempt`
/// event.
///
/// Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct Ledger {
    store: LedgerStore,
    inserts: InsertCapability,
    gate: MutationGate,
    queries: QueryFacade,
    settings: LedgerSettings,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Start building a ledger.
    #[must_use]
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    /// Non-durable ledger with default policy and settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    /// Open the ledger described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Configuration`] for an invalid retention table,
    /// a `surrealkv` backend without a path, or a `surrealkv` backend in a
    /// build without the `kv` feature. Returns
    /// [`LedgerError::StoreUnavailable`] if the engine cannot be opened.
    pub fn from_config(config: &Config) -> LedgerResult<Self> {
        let policy = RetentionPolicy::from_config(&config.retention)
            .map_err(|e| LedgerError::Configuration(e.to_string()))?;
        let settings = LedgerSettings::from_config(config);

        match config.storage.backend {
            StorageBackend::Memory => Ok(Self::builder().policy(policy).settings(settings).build()),
            StorageBackend::Surrealkv => {
                let path = config.storage.path.as_deref().ok_or_else(|| {
                    LedgerError::Configuration("storage.path is required for surrealkv".to_owned())
                })?;
                open_surrealkv(path, policy, settings)
            },
        }
    }

    /// Open a durable ledger on `SurrealKV` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if the engine cannot be opened.
    #[cfg(feature = "kv")]
    pub fn open(
        path: impl AsRef<std::path::Path>,
        policy: RetentionPolicy,
        settings: LedgerSettings,
    ) -> LedgerResult<Self> {
        open_surrealkv(path.as_ref(), policy, settings)
    }

    /// Commit a new record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ConstraintViolation`] for malformed input or input in
    ///   the reserved `audit.` namespace or `system` tenant.
    /// - [`LedgerError::StoreUnavailable`] on transient storage faults; the
    ///   record was not committed and the append may be retried.
    pub async fn append(&self, request: AppendRequest) -> LedgerResult<AppendReceipt> {
        let span = OperationContext::new("ledger")
            .with_operation("append")
            .with_actor(request.actor_id.clone())
            .with_tenant(request.tenant_id.as_str())
            .span();
        self.store.append(request, Origin::Caller).instrument(span).await
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if no record has this id.
    pub async fn get(&self, id: &RecordId) -> LedgerResult<AuditRecord> {
        self.store.get(id).await
    }

    /// Run a query.
    ///
    /// A cross-tenant query is itself recorded first when
    /// `audit_cross_tenant` is on; if that record cannot be written the
    /// query does not run.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidQuery`] for malformed queries;
    /// [`LedgerError::StoreUnavailable`] on storage faults.
    pub async fn query(&self, query: &LedgerQuery) -> LedgerResult<QueryPage> {
        let mut ctx = OperationContext::new("ledger").with_operation("query");
        match &query.scope {
            QueryScope::Tenant(t) => ctx = ctx.with_tenant(t.as_str()),
            QueryScope::CrossTenant(grant) => ctx = ctx.with_actor(grant.actor_id.clone()),
        }

        async {
            self.queries.validate(query)?;
            if let QueryScope::CrossTenant(grant) = &query.scope {
                let filters = serde_json::json!({
                    "time_range": query.time_range,
                    "action_type": query.action_type,
                    "resource_id": query.resource_id,
                    "limit": query.limit,
                });
                self.audit_cross_tenant(grant, "query", filters).await?;
            }
            self.queries.run(query).await
        }
        .instrument(ctx.span())
        .await
    }

    /// Records whose retention has lapsed as of `as_of`, for the external
    /// purge process. Deletes nothing.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidQuery`] for an out-of-bounds `limit` or an
    /// incomplete grant.
    pub async fn purge_candidates(
        &self,
        grant: &CrossTenantGrant,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> LedgerResult<Vec<PurgeCandidate>> {
        grant.validate()?;
        self.queries.check_limit(limit)?;
        let filters = serde_json::json!({ "as_of": as_of, "limit": limit });
        self.audit_cross_tenant(grant, "purge_candidates", filters)
            .await?;
        self.queries.purge_candidates(as_of, limit).await
    }

    /// Total committed records, including the ledger's own events.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] on storage faults.
    pub async fn count(&self) -> LedgerResult<usize> {
        self.store.count().await
    }

    /// Flush and release the storage engine. Call before reopening a
    /// durable ledger at the same path.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] if the flush fails.
    pub async fn close(&self) -> LedgerResult<()> {
        self.store.close().await?;
        info!("ledger closed");
        Ok(())
    }

    /// Low-level key/value access to the ledger's storage, for tooling that
    /// expects a [`KvStore`]. Overwrites and deletes through it are refused
    /// and recorded under `context`.
    #[must_use]
    pub fn raw_store(&self, context: AttemptContext) -> Arc<dyn KvStore> {
        Arc::new(WormStore::new(
            self.store.reads().clone(),
            self.inserts.clone(),
            self.gate.clone(),
            context,
        ))
    }

    /// The refusal path for update and delete requests.
    #[must_use]
    pub fn mutation_gate(&self) -> &MutationGate {
        &self.gate
    }

    /// Retention policy in force.
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        self.store.policy()
    }

    /// Runtime limits in force.
    #[must_use]
    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    async fn audit_cross_tenant(
        &self,
        grant: &CrossTenantGrant,
        operation: &str,
        filters: Value,
    ) -> LedgerResult<()> {
        if !self.settings.audit_cross_tenant {
            return Ok(());
        }
        let request = AppendRequest::new(
            grant.actor_id.clone(),
            TenantId::system(),
            actions::CROSS_TENANT_QUERY,
        )
        .meta("operation", operation)
        .meta("reason", grant.reason.clone())
        .meta("filters", filters);

        match self.store.append(request, Origin::Ledger).await {
            Ok(receipt) => {
                info!(
                    record_id = %receipt.record_id,
                    actor_id = %grant.actor_id,
                    operation,
                    "cross-tenant read recorded"
                );
                Ok(())
            },
            Err(e) => {
                warn!(
                    actor_id = %grant.actor_id,
                    error = %e,
                    "cross-tenant read refused: audit record failed"
                );
                Err(e)
            },
        }
    }
}

#[cfg(feature = "kv")]
fn open_surrealkv(
    path: &std::path::Path,
    policy: RetentionPolicy,
    settings: LedgerSettings,
) -> LedgerResult<Ledger> {
    let engine = vellum_storage::SurrealKvStore::open(path)?;
    info!(path = %path.display(), "opened surrealkv ledger store");
    Ok(Ledger::builder()
        .engine(engine)
        .policy(policy)
        .settings(settings)
        .build())
}

#[cfg(not(feature = "kv"))]
fn open_surrealkv(
    path: &std::path::Path,
    _policy: RetentionPolicy,
    _settings: LedgerSettings,
) -> LedgerResult<Ledger> {
    Err(LedgerError::Configuration(format!(
        "surrealkv backend at {} requires the `kv` feature",
        path.display()
    )))
}
