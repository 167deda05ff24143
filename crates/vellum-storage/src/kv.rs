//! Raw key-value store trait and implementations.
//!
//! The [`KvStore`] trait provides byte-level operations with namespaced keys.
//! Implementations:
//!
//! - **In-memory** (always available): For tests and ephemeral ledgers
//! - **`SurrealKV`** (behind `kv` feature): Persistent, versioned, ACID-compliant
//!
//! # Ordering
//!
//! Keys within a namespace are ordered by their UTF-8 bytes. [`KvStore::range`]
//! and [`KvStore::list_keys`] always return entries in ascending key order,
//! so callers can encode sort keys directly into key strings.
//!
//! # Insert vs. set
//!
//! [`KvStore::set`] is an upsert. [`KvStore::insert_batch`] only ever creates
//! keys: if any key in the batch already exists nothing is written and
//! [`StorageError::AlreadyExists`] is returned. Append-only callers should
//! write exclusively through `insert_batch`.

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate that a namespace is safe for use as a key prefix.
///
/// Namespaces must be non-empty and must not contain the null byte
/// (used internally as the namespace/key separator).
fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Validate that a key is safe for storage.
///
/// Keys must be non-empty and must not contain the null byte.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Validate a range bound. Bounds may be empty (namespace start).
fn validate_bound(bound: &str) -> StorageResult<()> {
    if bound.contains('\0') {
        return Err(StorageError::InvalidKey(
            "range bound must not contain null bytes".into(),
        ));
    }
    Ok(())
}

/// Smallest string that sorts after every string starting with `prefix`.
///
/// Returns `None` when no such bound exists (empty prefix, or a prefix made
/// only of `char::MAX`), in which case the scan should run to the end of
/// the namespace.
#[must_use]
pub fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = u32::from(last)
            .checked_add(1)
            .and_then(|code| {
                // Skip the surrogate gap.
                if (0xD800..=0xDFFF).contains(&code) {
                    char::from_u32(0xE000)
                } else {
                    char::from_u32(code)
                }
            });
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

/// Build the composite key `"{namespace}\0{key}"` as bytes.
#[cfg(feature = "kv")]
fn composite_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1).saturating_add(key.len()));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf.extend_from_slice(key.as_bytes());
    buf
}

/// Build the end of the namespace range (exclusive): `"{namespace}\x01"`.
///
/// Since `\0` is the separator, any key in the namespace has the form
/// `"{namespace}\0{key}"`. The byte `\x01` immediately follows `\0`,
/// so the range `["{namespace}\0", "{namespace}\x01")` captures exactly
/// all keys in the namespace.
#[cfg(feature = "kv")]
fn namespace_range_end(namespace: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(namespace.len().saturating_add(1));
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(1);
    buf
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A key-value entry with its namespace and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    /// The namespace this entry belongs to.
    pub namespace: String,
    /// The key within the namespace.
    pub key: String,
    /// The raw value bytes.
    pub value: Vec<u8>,
}

impl KvEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Raw key-value store trait.
///
/// Provides namespaced byte-level storage. All operations are scoped
/// to a namespace for isolation.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by namespace and key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Set a value for a namespace and key.
    ///
    /// Overwrites any existing value.
    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically create every entry in `entries`.
    ///
    /// Either all entries are committed or none are. Fails with
    /// [`StorageError::AlreadyExists`] if any key is already present (or
    /// appears twice in the batch).
    async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()>;

    /// Create a single key. Shorthand for a one-entry [`insert_batch`](Self::insert_batch).
    async fn insert(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.insert_batch(vec![KvEntry::new(namespace, key, value)])
            .await
    }

    /// Delete a key from a namespace.
    ///
    /// Returns `true` if the key existed and was deleted.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// Check if a key exists in a namespace.
    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List all keys in a namespace, in ascending order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Scan entries whose key lies in `[start, end)`, in ascending key order.
    ///
    /// An empty `start` begins at the first key of the namespace; `end =
    /// None` runs to the end of the namespace. At most `limit` entries are
    /// returned when a limit is given.
    async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>>;

    /// Delete all keys in a namespace.
    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64>;

    /// Flush pending writes and release the backing files. A no-op for
    /// stores without any.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (always available)
// ---------------------------------------------------------------------------

/// In-memory key-value store for tests and ephemeral data.
///
/// Keys are stored as `"{namespace}\0{key}"` in a `BTreeMap`, which keeps
/// every namespace contiguous and ordered.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: std::sync::RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    /// Create a new empty in-memory KV store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{namespace}\0{key}")
    }

    fn namespace_end(namespace: &str) -> String {
        format!("{namespace}\x01")
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.get(&Self::full_key(namespace, key)).cloned())
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        data.insert(Self::full_key(namespace, key), value);
        Ok(())
    }

    async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()> {
        let mut keyed = Vec::with_capacity(entries.len());
        for entry in entries {
            validate_namespace(&entry.namespace)?;
            validate_key(&entry.key)?;
            keyed.push((Self::full_key(&entry.namespace, &entry.key), entry));
        }

        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        {
            let mut seen = std::collections::HashSet::with_capacity(keyed.len());
            for (full, entry) in &keyed {
                if data.contains_key(full) || !seen.insert(full.as_str()) {
                    return Err(StorageError::AlreadyExists(format!(
                        "{}/{}",
                        entry.namespace, entry.key
                    )));
                }
            }
        }

        for (full, entry) in keyed {
            data.insert(full, entry.value);
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.remove(&Self::full_key(namespace, key)).is_some())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(data.contains_key(&Self::full_key(namespace, key)))
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let entries = self.range(namespace, "", None, None).await?;
        Ok(entries.into_iter().map(|e| e.key).collect())
    }

    async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>> {
        validate_namespace(namespace)?;
        validate_bound(start)?;
        let lo = Self::full_key(namespace, start);
        let hi = match end {
            Some(end) => {
                validate_bound(end)?;
                Self::full_key(namespace, end)
            },
            None => Self::namespace_end(namespace),
        };
        if lo >= hi {
            return Ok(Vec::new());
        }

        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let prefix = format!("{namespace}\0");
        let iter = data
            .range::<str, _>((Bound::Included(lo.as_str()), Bound::Excluded(hi.as_str())))
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|key| KvEntry::new(namespace, key, v.clone()))
            });
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let prefix = format!("{namespace}\0");
        let keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        let count = keys.len() as u64;
        for key in keys {
            data.remove(&key);
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// SurrealKV implementation (behind `kv` feature)
// ---------------------------------------------------------------------------

/// Persistent key-value store backed by `SurrealKV`.
///
/// ACID-compliant, versioned, embedded LSM-tree storage.
/// All operations use transactions internally; an `insert_batch` is a single
/// transaction, so a record and its index entries land together or not at all.
///
/// # Example
///
/// ```rust,ignore
/// use vellum_storage::kv::SurrealKvStore;
///
/// let store = SurrealKvStore::open("./data/ledger")?;
/// store.insert("ledger:records", "id", b"{}".to_vec()).await?;
/// ```
#[cfg(feature = "kv")]
pub struct SurrealKvStore {
    tree: surrealkv::Tree,
}

#[cfg(feature = "kv")]
impl std::fmt::Debug for SurrealKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurrealKvStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "kv")]
impl SurrealKvStore {
    /// Open a persistent KV store at the given directory path.
    ///
    /// Creates the directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the store cannot be opened.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        let tree = surrealkv::TreeBuilder::new()
            .with_path(path.as_ref().to_path_buf())
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        tracing::debug!(path = %path.as_ref().display(), "opened SurrealKV store");
        Ok(Self { tree })
    }

    /// Collect raw composite keys in `[start, end)` within a read transaction.
    fn scan_keys(
        &self,
        start: &[u8],
        end: &[u8],
        limit: Option<usize>,
    ) -> StorageResult<Vec<Vec<u8>>> {
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut iter = tx.range(start, end).map_err(|ref e| map_kv_err(e))?;
        iter.seek_first().map_err(|ref e| map_kv_err(e))?;

        let mut keys = Vec::new();
        while iter.valid() {
            if limit.is_some_and(|n| keys.len() >= n) {
                break;
            }
            keys.push(iter.key());
            iter.next().map_err(|ref e| map_kv_err(e))?;
        }
        Ok(keys)
    }
}

#[cfg(feature = "kv")]
fn map_kv_err(e: &surrealkv::Error) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[cfg(feature = "kv")]
#[async_trait]
impl KvStore for SurrealKvStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        tx.get(&ck).map_err(|ref e| map_kv_err(e))
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        tx.set(&ck, &value).map_err(|ref e| map_kv_err(e))?;
        tx.commit().await.map_err(|ref e| map_kv_err(e))
    }

    async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()> {
        for entry in &entries {
            validate_namespace(&entry.namespace)?;
            validate_key(&entry.key)?;
        }

        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let mut seen = std::collections::HashSet::with_capacity(entries.len());
        for entry in &entries {
            let ck = composite_key(&entry.namespace, &entry.key);
            let present = tx.get(&ck).map_err(|ref e| map_kv_err(e))?.is_some();
            if present || !seen.insert(ck.clone()) {
                // Dropping the uncommitted transaction discards staged writes.
                return Err(StorageError::AlreadyExists(format!(
                    "{}/{}",
                    entry.namespace, entry.key
                )));
            }
            tx.set(&ck, &entry.value).map_err(|ref e| map_kv_err(e))?;
        }
        tx.commit().await.map_err(|ref e| map_kv_err(e))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let ck = composite_key(namespace, key);
        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let existed = tx.get(&ck).map_err(|ref e| map_kv_err(e))?.is_some();
        if existed {
            tx.delete(&ck).map_err(|ref e| map_kv_err(e))?;
            tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        }
        Ok(existed)
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        let entries = self.range(namespace, "", None, None).await?;
        Ok(entries.into_iter().map(|e| e.key).collect())
    }

    async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>> {
        validate_namespace(namespace)?;
        validate_bound(start)?;
        let lo = composite_key(namespace, start);
        let hi = match end {
            Some(end) => {
                validate_bound(end)?;
                composite_key(namespace, end)
            },
            None => namespace_range_end(namespace),
        };
        if lo >= hi {
            return Ok(Vec::new());
        }

        let prefix_len = namespace.len().saturating_add(1); // namespace + \0
        let raw_keys = self.scan_keys(&lo, &hi, limit)?;

        let tx = self
            .tree
            .begin_with_mode(surrealkv::Mode::ReadOnly)
            .map_err(|ref e| map_kv_err(e))?;
        let mut entries = Vec::with_capacity(raw_keys.len());
        for raw_key in raw_keys {
            let Some(suffix) = raw_key.get(prefix_len..) else {
                continue;
            };
            let Ok(key) = std::str::from_utf8(suffix) else {
                continue;
            };
            // A key removed between the scan and this read is skipped.
            if let Some(value) = tx.get(&raw_key).map_err(|ref e| map_kv_err(e))? {
                entries.push(KvEntry::new(namespace, key, value));
            }
        }
        Ok(entries)
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let start = composite_key(namespace, "");
        let end = namespace_range_end(namespace);
        let keys_to_delete = self.scan_keys(&start, &end, None)?;

        let mut tx = self.tree.begin().map_err(|ref e| map_kv_err(e))?;
        let count = keys_to_delete.len() as u64;
        for key in &keys_to_delete {
            tx.delete(key).map_err(|ref e| map_kv_err(e))?;
        }
        if count > 0 {
            tx.commit().await.map_err(|ref e| map_kv_err(e))?;
        }
        Ok(count)
    }

    async fn close(&self) -> StorageResult<()> {
        self.tree
            .close()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- MemoryKvStore tests --

    #[tokio::test]
    async fn test_memory_get_set() {
        let store = MemoryKvStore::new();
        store.set("ns1", "key1", b"hello".to_vec()).await.unwrap();
        let val = store.get("ns1", "key1").await.unwrap();
        assert_eq!(val, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_get_missing() {
        let store = MemoryKvStore::new();
        let val = store.get("ns1", "missing").await.unwrap();
        assert!(val.is_none());
    }

    #[tokio::test]
    async fn test_memory_insert_refuses_existing_key() {
        let store = MemoryKvStore::new();
        store.insert("ns1", "k", b"v1".to_vec()).await.unwrap();
        let err = store.insert("ns1", "k", b"v2".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_insert_batch_is_all_or_nothing() {
        let store = MemoryKvStore::new();
        store.insert("idx", "taken", b"x".to_vec()).await.unwrap();

        let err = store
            .insert_batch(vec![
                KvEntry::new("records", "r1", b"record".to_vec()),
                KvEntry::new("idx", "taken", b"y".to_vec()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert!(!store.exists("records", "r1").await.unwrap());
        assert_eq!(store.get("idx", "taken").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_insert_batch_rejects_duplicate_within_batch() {
        let store = MemoryKvStore::new();
        let err = store
            .insert_batch(vec![
                KvEntry::new("ns", "k", b"1".to_vec()),
                KvEntry::new("ns", "k", b"2".to_vec()),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert!(store.list_keys("ns").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v".to_vec()).await.unwrap();
        assert!(store.delete("ns1", "k").await.unwrap());
        assert!(!store.delete("ns1", "k").await.unwrap());
        assert!(store.get("ns1", "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_namespace_isolation() {
        let store = MemoryKvStore::new();
        store.set("ns1", "k", b"v1".to_vec()).await.unwrap();
        store.set("ns2", "k", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("ns1", "k").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get("ns2", "k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_list_keys_sorted() {
        let store = MemoryKvStore::new();
        store.set("ns1", "b", b"2".to_vec()).await.unwrap();
        store.set("ns1", "a", b"1".to_vec()).await.unwrap();
        store.set("ns2", "c", b"3".to_vec()).await.unwrap();
        assert_eq!(store.list_keys("ns1").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_memory_range_bounds_and_limit() {
        let store = MemoryKvStore::new();
        for key in ["t1\u{1f}a", "t1\u{1f}b", "t1\u{1f}c", "t2\u{1f}a"] {
            store.insert("idx", key, Vec::new()).await.unwrap();
        }

        let end = prefix_upper_bound("t1\u{1f}").unwrap();
        let all_t1 = store.range("idx", "t1\u{1f}", Some(&end), None).await.unwrap();
        let keys: Vec<_> = all_t1.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["t1\u{1f}a", "t1\u{1f}b", "t1\u{1f}c"]);

        let limited = store
            .range("idx", "t1\u{1f}b", Some(&end), Some(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].key, "t1\u{1f}b");
    }

    #[tokio::test]
    async fn test_memory_range_inverted_bounds_is_empty() {
        let store = MemoryKvStore::new();
        store.insert("ns", "m", Vec::new()).await.unwrap();
        let entries = store.range("ns", "z", Some("a"), None).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_memory_clear_namespace() {
        let store = MemoryKvStore::new();
        store.set("ns1", "a", b"1".to_vec()).await.unwrap();
        store.set("ns1", "b", b"2".to_vec()).await.unwrap();
        store.set("ns2", "c", b"3".to_vec()).await.unwrap();
        let cleared = store.clear_namespace("ns1").await.unwrap();
        assert_eq!(cleared, 2);
        assert!(store.list_keys("ns1").await.unwrap().is_empty());
        assert_eq!(store.list_keys("ns2").await.unwrap().len(), 1);
    }

    // -- Validation tests --

    #[test]
    fn test_validate_namespace_rejects_empty() {
        assert!(validate_namespace("").is_err());
    }

    #[test]
    fn test_validate_key_rejects_null_byte() {
        assert!(validate_key("k\0bad").is_err());
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound("abc").as_deref(), Some("abd"));
        assert_eq!(prefix_upper_bound("t1\u{1f}").as_deref(), Some("t1 "));
        assert_eq!(prefix_upper_bound(""), None);
        assert_eq!(
            prefix_upper_bound(&format!("a{}", char::MAX)).as_deref(),
            Some("b")
        );
    }

    // -- SurrealKvStore tests (behind feature gate) --

    #[cfg(feature = "kv")]
    mod surreal_kv_tests {
        use super::*;

        fn make_store() -> (SurrealKvStore, tempfile::TempDir) {
            let dir = tempfile::tempdir().unwrap();
            let store = SurrealKvStore::open(dir.path()).unwrap();
            (store, dir)
        }

        #[tokio::test]
        async fn test_surreal_get_set() {
            let (store, _dir) = make_store();
            store.set("ns1", "key1", b"hello".to_vec()).await.unwrap();
            let val = store.get("ns1", "key1").await.unwrap();
            assert_eq!(val, Some(b"hello".to_vec()));
        }

        #[tokio::test]
        async fn test_surreal_insert_batch_all_or_nothing() {
            let (store, _dir) = make_store();
            store.insert("idx", "taken", b"x".to_vec()).await.unwrap();
            let err = store
                .insert_batch(vec![
                    KvEntry::new("records", "r1", b"record".to_vec()),
                    KvEntry::new("idx", "taken", b"y".to_vec()),
                ])
                .await
                .unwrap_err();
            assert!(matches!(err, StorageError::AlreadyExists(_)));
            assert!(!store.exists("records", "r1").await.unwrap());
        }

        #[tokio::test]
        async fn test_surreal_range_ordered() {
            let (store, _dir) = make_store();
            for key in ["c", "a", "b"] {
                store.insert("ns", key, key.as_bytes().to_vec()).await.unwrap();
            }
            let entries = store.range("ns", "", None, None).await.unwrap();
            let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
            assert_eq!(keys, vec!["a", "b", "c"]);
            assert_eq!(entries[0].value, b"a".to_vec());
        }

        #[tokio::test]
        async fn test_surreal_clear_namespace() {
            let (store, _dir) = make_store();
            store.set("ns1", "a", b"1".to_vec()).await.unwrap();
            store.set("ns1", "b", b"2".to_vec()).await.unwrap();
            store.set("ns2", "c", b"3".to_vec()).await.unwrap();
            let cleared = store.clear_namespace("ns1").await.unwrap();
            assert_eq!(cleared, 2);
            assert!(store.list_keys("ns1").await.unwrap().is_empty());
            assert_eq!(store.list_keys("ns2").await.unwrap().len(), 1);
        }
    }
}
