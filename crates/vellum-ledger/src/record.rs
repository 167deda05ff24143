//! The audit record and the append request/receipt around it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

/// Action types the ledger itself emits.
pub mod actions {
    /// A rejected update or delete of committed ledger data.
    pub const TAMPERING_ATTEMPT: &str = "audit.tampering.attempt";
    /// A query that read across tenant boundaries.
    pub const CROSS_TENANT_QUERY: &str = "audit.query.cross_tenant";

    /// First segment reserved for ledger-generated events.
    pub(crate) const RESERVED_NAMESPACE: &str = "audit";
}

/// Maximum byte length of actor, tenant and resource identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Maximum byte length of an action type.
pub const MAX_ACTION_TYPE_LEN: usize = 128;

const SYSTEM_TENANT: &str = "system";

/// Globally unique record identifier, assigned at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a record id from its hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if `s` is not a UUID.
    pub fn parse(s: &str) -> LedgerResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| LedgerError::ConstraintViolation(format!("invalid record id '{s}': {e}")))
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Owning tenant of a record.
///
/// The value `"system"` is reserved for events that belong to no tenant.
/// It cannot be built through [`TenantId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConstraintViolation`] if the id is empty, too
    /// long, contains control characters, or is the reserved `"system"`.
    pub fn new(id: impl Into<String>) -> LedgerResult<Self> {
        let id = id.into();
        validate_identifier("tenant_id", &id).map_err(LedgerError::ConstraintViolation)?;
        if id == SYSTEM_TENANT {
            return Err(LedgerError::ConstraintViolation(
                "tenant_id 'system' is reserved".to_owned(),
            ));
        }
        Ok(Self(id))
    }

    pub(crate) fn system() -> Self {
        Self(SYSTEM_TENANT.to_owned())
    }

    /// A tenant read back from committed data; validated when it was written.
    pub(crate) fn from_stored(id: String) -> Self {
        Self(id)
    }

    /// Whether this is the reserved system tenant.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_TENANT
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed ledger entry. Never changes after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Assigned at commit.
    pub id: RecordId,
    /// Who caused the event.
    pub actor_id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Caller-asserted event time. May be backdated.
    pub occurred_at: DateTime<Utc>,
    /// Dot-namespaced event taxonomy, e.g. `auth.login.failed`.
    pub action_type: String,
    /// Subject of the event, if any.
    pub resource_id: Option<String>,
    /// Opaque structured payload.
    pub metadata: Map<String, Value>,
    /// Earliest instant the record may be purged. Always after `recorded_at`.
    pub retention_until: DateTime<Utc>,
    /// Commit time. Non-decreasing in insertion order.
    pub recorded_at: DateTime<Utc>,
}

/// Input to an append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Who caused the event.
    pub actor_id: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Caller-asserted event time.
    pub occurred_at: DateTime<Utc>,
    /// Dot-namespaced event taxonomy.
    pub action_type: String,
    /// Subject of the event, if any.
    pub resource_id: Option<String>,
    /// Opaque structured payload.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AppendRequest {
    /// Start a request for an event that occurred now.
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        tenant_id: TenantId,
        action_type: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id,
            occurred_at: Utc::now(),
            action_type: action_type.into(),
            resource_id: None,
            metadata: Map::new(),
        }
    }

    /// Set the event time.
    #[must_use]
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = at;
        self
    }

    /// Set the subject of the event.
    #[must_use]
    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Add one metadata field.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Replace the metadata payload.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the request before commit.
    ///
    /// `Origin::Caller` additionally refuses the reserved tenant and the
    /// reserved action namespace, and enforces the metadata size limit. The
    /// ledger bounds the payloads of its own events itself.
    pub(crate) fn validate(&self, max_metadata_bytes: usize, origin: Origin) -> LedgerResult<()> {
        let violation = LedgerError::ConstraintViolation;

        validate_identifier("actor_id", &self.actor_id).map_err(violation)?;
        validate_identifier("tenant_id", self.tenant_id.as_str()).map_err(violation)?;
        if let Some(resource) = &self.resource_id {
            validate_identifier("resource_id", resource).map_err(violation)?;
        }
        validate_action_type(&self.action_type).map_err(violation)?;

        if origin == Origin::Caller {
            if self.tenant_id.is_system() {
                return Err(violation("tenant_id 'system' is reserved".to_owned()));
            }
            if is_reserved_action(&self.action_type) {
                return Err(violation(format!(
                    "action_type '{}' is in the reserved '{}.' namespace",
                    self.action_type,
                    actions::RESERVED_NAMESPACE
                )));
            }

            let size = serde_json::to_vec(&self.metadata)?.len();
            if size > max_metadata_bytes {
                return Err(violation(format!(
                    "metadata is {size} bytes, exceeding the {max_metadata_bytes} byte limit"
                )));
            }
        }
        Ok(())
    }
}

/// Who is asking for a record to be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// An ordinary caller of the public append path.
    Caller,
    /// The ledger recording its own events.
    Ledger,
}

/// What an append returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Id of the new record.
    pub record_id: RecordId,
    /// Commit time.
    pub recorded_at: DateTime<Utc>,
    /// Retention horizon stamped at commit.
    pub retention_until: DateTime<Utc>,
}

impl From<&AuditRecord> for AppendReceipt {
    fn from(r: &AuditRecord) -> Self {
        Self {
            record_id: r.id,
            recorded_at: r.recorded_at,
            retention_until: r.retention_until,
        }
    }
}

/// Non-empty, bounded, and free of control characters.
pub(crate) fn validate_identifier(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "{field} is {} bytes, exceeding the {MAX_IDENTIFIER_LEN} byte limit",
            value.len()
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{field} must not contain control characters"));
    }
    Ok(())
}

/// At least two dot-separated segments of `[a-z0-9_-]`.
pub(crate) fn validate_action_type(value: &str) -> Result<(), String> {
    if value.len() > MAX_ACTION_TYPE_LEN {
        return Err(format!(
            "action_type is {} bytes, exceeding the {MAX_ACTION_TYPE_LEN} byte limit",
            value.len()
        ));
    }
    let mut segments = 0usize;
    for segment in value.split('.') {
        if segment.is_empty()
            || !segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
        {
            return Err(format!(
                "action_type '{value}' must be dot-separated segments of [a-z0-9_-]"
            ));
        }
        segments = segments.saturating_add(1);
    }
    if segments < 2 {
        return Err(format!(
            "action_type '{value}' needs at least two segments, e.g. 'auth.login'"
        ));
    }
    Ok(())
}

fn is_reserved_action(action_type: &str) -> bool {
    action_type
        .split('.')
        .next()
        .is_some_and(|first| first == actions::RESERVED_NAMESPACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("acme").unwrap()
    }

    #[test]
    fn test_tenant_rejects_reserved_and_malformed() {
        assert!(TenantId::new("system").is_err());
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("ac\nme").is_err());
        assert!(TenantId::new("a".repeat(MAX_IDENTIFIER_LEN.saturating_add(1))).is_err());
        assert!(TenantId::new("a".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(TenantId::system().is_system());
    }

    #[test]
    fn test_action_type_rules() {
        assert!(validate_action_type("auth.login").is_ok());
        assert!(validate_action_type("billing.invoice.void_v2").is_ok());
        assert!(validate_action_type("auth").is_err());
        assert!(validate_action_type("Auth.Login").is_err());
        assert!(validate_action_type("auth..login").is_err());
        assert!(validate_action_type(".auth").is_err());
        assert!(validate_action_type(&format!("a.{}", "b".repeat(MAX_ACTION_TYPE_LEN))).is_err());
    }

    #[test]
    fn test_caller_cannot_use_reserved_namespace() {
        let req = AppendRequest::new("svc", tenant(), actions::TAMPERING_ATTEMPT);
        let err = req.validate(1024, Origin::Caller).unwrap_err();
        assert!(matches!(err, LedgerError::ConstraintViolation(_)));
        assert!(req.validate(1024, Origin::Ledger).is_ok());

        // "auditing.*" is not the reserved namespace.
        let req = AppendRequest::new("svc", tenant(), "auditing.export");
        assert!(req.validate(1024, Origin::Caller).is_ok());
    }

    #[test]
    fn test_caller_cannot_use_system_tenant() {
        let req = AppendRequest::new("svc", TenantId::system(), "auth.login");
        assert!(req.validate(1024, Origin::Caller).is_err());
        assert!(req.validate(1024, Origin::Ledger).is_ok());
    }

    #[test]
    fn test_metadata_size_limit() {
        let req = AppendRequest::new("svc", tenant(), "auth.login").meta("blob", "x".repeat(200));
        assert!(req.validate(100, Origin::Caller).is_err());
        assert!(req.validate(1024, Origin::Caller).is_ok());
    }

    #[test]
    fn test_resource_id_validated_when_present() {
        let req = AppendRequest::new("svc", tenant(), "auth.login").resource("");
        assert!(req.validate(1024, Origin::Caller).is_err());
    }

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        assert_eq!(RecordId::parse(&id.to_string()).unwrap(), id);
        assert!(RecordId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_tenant_serializes_as_plain_string() {
        let json = serde_json::to_string(&tenant()).unwrap();
        assert_eq!(json, "\"acme\"");
    }
}
