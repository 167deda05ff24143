//! Persisted key layout.
//!
//! Records live in [`RECORDS_NS`] keyed by id. Each secondary index is its
//! own namespace whose keys sort in query order:
//!
//! | Namespace | Key |
//! |-----------|-----|
//! | `ledger:idx:tenant_occurred` | `{tenant}␟{occurred}␟{recorded}␟{id}` |
//! | `ledger:idx:occurred` | `{occurred}␟{recorded}␟{id}` |
//! | `ledger:idx:action` | `{action_type}␟{occurred}␟{recorded}␟{id}` |
//! | `ledger:idx:resource` | `{resource_id}␟{occurred}␟{recorded}␟{id}` |
//! | `ledger:idx:retention` | `{retention_until}␟{id}` |
//!
//! `␟` is U+001F, which validated identifiers can never contain. Every
//! index value is the owning tenant, so tenant filtering needs no record
//! fetch. The composite index doubles as the tenant index through its
//! leading column.

use chrono::{DateTime, Utc};
use vellum_storage::KvEntry;

use crate::error::LedgerResult;
use crate::record::{AuditRecord, RecordId};

/// Every namespace under this prefix is written by the append path only.
pub(crate) const LEDGER_NS_PREFIX: &str = "ledger:";
pub(crate) const RECORDS_NS: &str = "ledger:records";
pub(crate) const INDEX_NS_PREFIX: &str = "ledger:idx:";
pub(crate) const IDX_TENANT_OCCURRED: &str = "ledger:idx:tenant_occurred";
pub(crate) const IDX_OCCURRED: &str = "ledger:idx:occurred";
pub(crate) const IDX_ACTION: &str = "ledger:idx:action";
pub(crate) const IDX_RESOURCE: &str = "ledger:idx:resource";
pub(crate) const IDX_RETENTION: &str = "ledger:idx:retention";

/// Field separator inside index keys.
pub(crate) const SEP: char = '\u{1f}';

/// Appended to a key to form the smallest bound strictly after it.
pub(crate) const AFTER: char = '\u{1}';

const SIGN_FLIP: u64 = 0x8000_0000_0000_0000;

/// Order-preserving fixed-width encoding of a timestamp (microseconds).
pub(crate) fn encode_ts(t: DateTime<Utc>) -> String {
    format!("{:016x}", t.timestamp_micros().cast_unsigned() ^ SIGN_FLIP)
}

pub(crate) fn decode_ts(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != 16 {
        return None;
    }
    let raw = u64::from_str_radix(s, 16).ok()?;
    DateTime::from_timestamp_micros((raw ^ SIGN_FLIP).cast_signed())
}

/// `{occurred}␟{recorded}␟{id}`: the tail shared by every ordered index.
pub(crate) fn sort_suffix(record: &AuditRecord) -> String {
    format!(
        "{}{SEP}{}{SEP}{}",
        encode_ts(record.occurred_at),
        encode_ts(record.recorded_at),
        record.id
    )
}

/// Whether `s` has the shape of a [`sort_suffix`].
pub(crate) fn is_sort_suffix(s: &str) -> bool {
    let mut parts = s.split(SEP);
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(occ), Some(rec), Some(id), None)
            if decode_ts(occ).is_some()
                && decode_ts(rec).is_some()
                && RecordId::parse(id).is_ok()
    )
}

/// Key under an index whose leading column is `value`.
pub(crate) fn prefixed(value: &str, suffix: &str) -> String {
    format!("{value}{SEP}{suffix}")
}

/// Whether `namespace` holds records or indexes.
pub(crate) fn is_ledger_namespace(namespace: &str) -> bool {
    namespace.starts_with(LEDGER_NS_PREFIX)
}

/// The record id an index key points at (its last segment).
pub(crate) fn record_id_of_index_key(key: &str) -> Option<RecordId> {
    key.rsplit(SEP)
        .next()
        .and_then(|id| RecordId::parse(id).ok())
}

/// The record entry plus every index entry for `record`, for one atomic
/// insert.
pub(crate) fn entries_for(record: &AuditRecord) -> LedgerResult<Vec<KvEntry>> {
    let suffix = sort_suffix(record);
    let tenant = record.tenant_id.as_str();
    let owner = || tenant.as_bytes().to_vec();

    let mut entries = vec![
        KvEntry::new(RECORDS_NS, record.id.to_string(), serde_json::to_vec(record)?),
        KvEntry::new(IDX_TENANT_OCCURRED, prefixed(tenant, &suffix), owner()),
        KvEntry::new(IDX_OCCURRED, suffix.clone(), owner()),
        KvEntry::new(IDX_ACTION, prefixed(&record.action_type, &suffix), owner()),
        KvEntry::new(
            IDX_RETENTION,
            prefixed(&encode_ts(record.retention_until), &record.id.to_string()),
            owner(),
        ),
    ];
    if let Some(resource) = &record.resource_id {
        entries.push(KvEntry::new(IDX_RESOURCE, prefixed(resource, &suffix), owner()));
    }
    Ok(entries)
}
