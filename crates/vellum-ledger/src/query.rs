//! Query Facade: tenant-scoped, index-driven reads.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vellum_storage::prefix_upper_bound;

use crate::error::{LedgerError, LedgerResult};
use crate::layout::{
    self, AFTER, IDX_ACTION, IDX_OCCURRED, IDX_RESOURCE, IDX_RETENTION, IDX_TENANT_OCCURRED, SEP,
};
use crate::record::{AuditRecord, RecordId, TenantId, validate_action_type, validate_identifier};
use crate::store::LedgerStore;
use crate::tamper::AlertSink;

/// Page size when the caller does not pick one.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Elevated capability to read across tenants, issued by the surrounding
/// authorization layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTenantGrant {
    /// Who is reading.
    pub actor_id: String,
    /// Why, as recorded in the `audit.query.cross_tenant` record.
    pub reason: String,
}

impl CrossTenantGrant {
    /// Create a grant.
    #[must_use]
    pub fn new(actor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        validate_identifier("grant actor_id", &self.actor_id).map_err(LedgerError::InvalidQuery)?;
        if self.reason.trim().is_empty() {
            return Err(LedgerError::InvalidQuery(
                "cross-tenant grant needs a reason".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Which records a query may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// One tenant's records.
    Tenant(TenantId),
    /// Every tenant's records.
    CrossTenant(CrossTenantGrant),
}

/// Inclusive `occurred_at` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest `occurred_at`, inclusive.
    pub start: DateTime<Utc>,
    /// Latest `occurred_at`, inclusive.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Whether `t` lies in the window.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// A read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerQuery {
    /// Tenant or cross-tenant.
    pub scope: QueryScope,
    /// Optional `occurred_at` window.
    pub time_range: Option<TimeRange>,
    /// Exact action type.
    pub action_type: Option<String>,
    /// Exact resource id.
    pub resource_id: Option<String>,
    /// Page size.
    pub limit: usize,
    /// Continuation from a previous page's `next_cursor`.
    pub cursor: Option<String>,
}

impl LedgerQuery {
    /// Records owned by `tenant_id`.
    #[must_use]
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self::with_scope(QueryScope::Tenant(tenant_id))
    }

    /// Records of every tenant.
    #[must_use]
    pub fn cross_tenant(grant: CrossTenantGrant) -> Self {
        Self::with_scope(QueryScope::CrossTenant(grant))
    }

    fn with_scope(scope: QueryScope) -> Self {
        Self {
            scope,
            time_range: None,
            action_type: None,
            resource_id: None,
            limit: DEFAULT_QUERY_LIMIT,
            cursor: None,
        }
    }

    /// Restrict to `occurred_at` in `[start, end]`.
    #[must_use]
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Restrict to one action type.
    #[must_use]
    pub fn action(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    /// Restrict to one resource.
    #[must_use]
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Continue after a previous page.
    #[must_use]
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    fn tenant_filter(&self) -> Option<&TenantId> {
        match &self.scope {
            QueryScope::Tenant(t) => Some(t),
            QueryScope::CrossTenant(_) => None,
        }
    }

    fn matches(&self, record: &AuditRecord) -> bool {
        self.tenant_filter().is_none_or(|t| &record.tenant_id == t)
            && self.time_range.is_none_or(|r| r.contains(record.occurred_at))
            && self
                .action_type
                .as_ref()
                .is_none_or(|a| &record.action_type == a)
            && self
                .resource_id
                .as_ref()
                .is_none_or(|r| record.resource_id.as_ref() == Some(r))
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    /// Ascending by `occurred_at`, then `recorded_at`, then id.
    pub records: Vec<AuditRecord>,
    /// Present only when more matching records exist.
    pub next_cursor: Option<String>,
}

/// A record whose retention has lapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCandidate {
    /// Expired record.
    pub record_id: RecordId,
    /// Its owner.
    pub tenant_id: TenantId,
    /// When it became purgeable.
    pub retention_until: DateTime<Utc>,
}

fn encode_cursor(suffix: &str) -> String {
    URL_SAFE_NO_PAD.encode(suffix)
}

fn decode_cursor(cursor: &str) -> LedgerResult<String> {
    let invalid = || LedgerError::InvalidQuery(format!("malformed cursor '{cursor}'"));
    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let suffix = String::from_utf8(bytes).map_err(|_| invalid())?;
    if !layout::is_sort_suffix(&suffix) {
        return Err(invalid());
    }
    Ok(suffix)
}

/// Index plan: namespace, key prefix, and whether index values must be
/// checked against the tenant.
struct Plan {
    namespace: &'static str,
    prefix: String,
    filter_tenant: bool,
}

fn plan(query: &LedgerQuery) -> Plan {
    let lead = |namespace, value: &str| Plan {
        namespace,
        prefix: format!("{value}{SEP}"),
        filter_tenant: query.tenant_filter().is_some(),
    };
    if let Some(resource) = &query.resource_id {
        lead(IDX_RESOURCE, resource)
    } else if let Some(action) = &query.action_type {
        lead(IDX_ACTION, action)
    } else if let Some(tenant) = query.tenant_filter() {
        Plan {
            namespace: IDX_TENANT_OCCURRED,
            prefix: format!("{tenant}{SEP}"),
            filter_tenant: false,
        }
    } else {
        Plan {
            namespace: IDX_OCCURRED,
            prefix: String::new(),
            filter_tenant: false,
        }
    }
}

#[derive(Clone)]
pub(crate) struct QueryFacade {
    store: LedgerStore,
    max_limit: usize,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFacade")
            .field("max_limit", &self.max_limit)
            .finish_non_exhaustive()
    }
}

impl QueryFacade {
    pub(crate) fn new(store: LedgerStore, max_limit: usize, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            max_limit,
            alerts,
        }
    }

    pub(crate) fn check_limit(&self, limit: usize) -> LedgerResult<()> {
        if limit == 0 || limit > self.max_limit {
            return Err(LedgerError::InvalidQuery(format!(
                "limit {limit} is outside 1..={}",
                self.max_limit
            )));
        }
        Ok(())
    }

    /// Validate `query`, returning the decoded cursor.
    pub(crate) fn validate(&self, query: &LedgerQuery) -> LedgerResult<Option<String>> {
        self.check_limit(query.limit)?;
        if let Some(range) = &query.time_range
            && range.start > range.end
        {
            return Err(LedgerError::InvalidQuery(format!(
                "time range start {} is after end {}",
                range.start, range.end
            )));
        }
        if let Some(action) = &query.action_type {
            validate_action_type(action).map_err(LedgerError::InvalidQuery)?;
        }
        if let Some(resource) = &query.resource_id {
            validate_identifier("resource_id", resource).map_err(LedgerError::InvalidQuery)?;
        }
        if let QueryScope::CrossTenant(grant) = &query.scope {
            grant.validate()?;
        }
        query.cursor.as_deref().map(decode_cursor).transpose()
    }

    pub(crate) async fn run(&self, query: &LedgerQuery) -> LedgerResult<QueryPage> {
        let cursor = self.validate(query)?;
        let plan = plan(query);

        let mut start = plan.prefix.clone();
        if let Some(range) = &query.time_range {
            start.push_str(&layout::encode_ts(range.start));
        }
        if let Some(suffix) = cursor {
            let resume = format!("{}{suffix}{AFTER}", plan.prefix);
            start = start.max(resume);
        }
        let end = match &query.time_range {
            Some(range) => prefix_upper_bound(&format!(
                "{}{}{SEP}",
                plan.prefix,
                layout::encode_ts(range.end)
            )),
            None if plan.prefix.is_empty() => None,
            None => prefix_upper_bound(&plan.prefix),
        };

        let wanted = query.limit.saturating_add(1);
        let tenant = query.tenant_filter().map(TenantId::as_str);
        let mut records: Vec<AuditRecord> = Vec::with_capacity(wanted);
        let mut scanned = 0usize;

        'scan: loop {
            if end.as_deref().is_some_and(|e| start.as_str() >= e) {
                break;
            }
            let batch = self
                .store
                .reads()
                .range(plan.namespace, &start, end.as_deref(), Some(wanted))
                .await?;
            let exhausted = batch.len() < wanted;

            for entry in &batch {
                scanned = scanned.saturating_add(1);
                if plan.filter_tenant && tenant.is_some_and(|t| entry.value != t.as_bytes()) {
                    continue;
                }
                let Some(id) = layout::record_id_of_index_key(&entry.key) else {
                    return Err(LedgerError::Serialization(format!(
                        "malformed index key in {}",
                        plan.namespace
                    )));
                };
                let record = match self.store.get(&id).await {
                    Ok(record) => record,
                    Err(LedgerError::NotFound(_)) => {
                        self.alerts.dangling_index_entry(plan.namespace, &entry.key);
                        continue;
                    },
                    Err(e) => return Err(e),
                };
                if query.matches(&record) {
                    records.push(record);
                    if records.len() >= wanted {
                        break 'scan;
                    }
                }
            }

            match batch.last() {
                Some(last) if !exhausted => start = format!("{}{AFTER}", last.key),
                _ => break,
            }
        }

        let next_cursor = if records.len() > query.limit {
            records.truncate(query.limit);
            records
                .last()
                .map(|r| encode_cursor(&layout::sort_suffix(r)))
        } else {
            None
        };

        debug!(
            index = plan.namespace,
            scanned,
            returned = records.len(),
            more = next_cursor.is_some(),
            "query executed"
        );
        Ok(QueryPage {
            records,
            next_cursor,
        })
    }

    /// Records whose `retention_until <= as_of`, earliest first.
    pub(crate) async fn purge_candidates(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> LedgerResult<Vec<PurgeCandidate>> {
        self.check_limit(limit)?;
        let end = prefix_upper_bound(&format!("{}{SEP}", layout::encode_ts(as_of)));
        let entries = self
            .store
            .reads()
            .range(IDX_RETENTION, "", end.as_deref(), Some(limit))
            .await?;

        entries
            .into_iter()
            .map(|entry| {
                let malformed =
                    || LedgerError::Serialization(format!("malformed retention key '{}'", entry.key));
                let (ts, id) = entry.key.split_once(SEP).ok_or_else(malformed)?;
                let retention_until = layout::decode_ts(ts).ok_or_else(malformed)?;
                let record_id = RecordId::parse(id).map_err(|_| malformed())?;
                let tenant = String::from_utf8(entry.value.clone()).map_err(|_| malformed())?;
                Ok(PurgeCandidate {
                    record_id,
                    tenant_id: TenantId::from_stored(tenant),
                    retention_until,
                })
            })
            .collect()
    }
}
