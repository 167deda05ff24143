//! Per-operation context for correlating ledger log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context carried through one ledger operation (an append, a query, a
/// rejected mutation) so its log lines can be correlated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Unique operation identifier.
    pub operation_id: Uuid,
    /// Actor on whose behalf the operation runs.
    pub actor_id: Option<String>,
    /// Tenant the operation is scoped to, if any.
    pub tenant_id: Option<String>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
    /// Component that created this context.
    pub source: String,
    /// Operation name (`append`, `query`, ...).
    pub operation: Option<String>,
}

impl OperationContext {
    /// Create a new root context.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            actor_id: None,
            tenant_id: None,
            started_at: Utc::now(),
            source: source.into(),
            operation: None,
        }
    }

    /// Set the actor.
    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Set the tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Create a tracing span for this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "ledger_op",
            operation_id = %self.operation_id,
            source = %self.source,
            operation = self.operation.as_deref(),
            actor_id = self.actor_id.as_deref(),
            tenant_id = self.tenant_id.as_deref(),
        )
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}
