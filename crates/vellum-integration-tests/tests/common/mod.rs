//! Shared test harness for integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use vellum_ledger::{
    AccessPath, AlertSink, AppendReceipt, AppendRequest, AttemptContext, Ledger, LedgerError,
    LedgerSettings, MutationAttempt, TenantId,
};
use vellum_storage::{KvEntry, KvStore, MemoryKvStore, StorageError, StorageResult};

/// Build a tenant id.
#[allow(dead_code)]
pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id).expect("valid tenant id")
}

/// Attempt context for a facade caller.
#[allow(dead_code)]
pub fn facade_ctx(actor: &str) -> AttemptContext {
    AttemptContext::new(actor, AccessPath::Facade).expect("valid actor id")
}

/// Attempt context for a raw storage caller.
#[allow(dead_code)]
pub fn storage_ctx(actor: &str) -> AttemptContext {
    AttemptContext::new(actor, AccessPath::Storage).expect("valid actor id")
}

/// A fixed instant on 2026-04-01, `minute` minutes past noon.
#[allow(dead_code)]
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 12, minute, 0)
        .single()
        .expect("valid timestamp")
}

/// Append an `auth.login` for `tenant_id` at `at(minute)`.
#[allow(dead_code)]
pub async fn login(ledger: &Ledger, tenant_id: &str, minute: u32) -> AppendReceipt {
    ledger
        .append(
            AppendRequest::new("svc-auth", tenant(tenant_id), "auth.login")
                .occurred_at(at(minute))
                .resource(format!("user-{minute}")),
        )
        .await
        .expect("append")
}

/// [`AlertSink`] that keeps every alert for inspection.
#[derive(Default)]
pub struct CapturingAlertSink {
    alerts: Mutex<Vec<(String, String)>>,
    dangling: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl CapturingAlertSink {
    /// `(key, error)` pairs for unrecorded tamper attempts, in arrival order.
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().expect("alert lock").clone()
    }

    /// `(namespace, key)` pairs for index entries without a record.
    pub fn dangling(&self) -> Vec<(String, String)> {
        self.dangling.lock().expect("alert lock").clone()
    }
}

impl AlertSink for CapturingAlertSink {
    fn tamper_record_failed(&self, attempt: &MutationAttempt, error: &LedgerError) {
        self.alerts
            .lock()
            .expect("alert lock")
            .push((attempt.key().to_owned(), error.to_string()));
    }

    fn dangling_index_entry(&self, namespace: &str, key: &str) {
        self.dangling
            .lock()
            .expect("alert lock")
            .push((namespace.to_owned(), key.to_owned()));
    }
}

/// Switches for the faults a [`FlakyStore`] injects. Clones share state.
#[derive(Clone, Default)]
pub struct Faults {
    fail_inserts: Arc<AtomicBool>,
    stall_inserts: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl Faults {
    /// Make subsequent inserts fail (or succeed again).
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent inserts hang until cancelled (or proceed again).
    pub fn stall_inserts(&self, stall: bool) {
        self.stall_inserts.store(stall, Ordering::SeqCst);
    }
}

/// In-memory engine whose inserts can be made to fail or hang on demand.
pub struct FlakyStore {
    inner: MemoryKvStore,
    faults: Faults,
}

impl FlakyStore {
    /// Engine driven by `faults`.
    pub fn new(faults: Faults) -> Self {
        Self {
            inner: MemoryKvStore::new(),
            faults,
        }
    }
}

#[async_trait]
impl KvStore for FlakyStore {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(namespace, key).await
    }

    async fn set(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.set(namespace, key, value).await
    }

    async fn insert_batch(&self, entries: Vec<KvEntry>) -> StorageResult<()> {
        if self.faults.stall_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.faults.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("disk unavailable".to_owned()));
        }
        self.inner.insert_batch(entries).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.inner.delete(namespace, key).await
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.inner.exists(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(namespace).await
    }

    async fn range(
        &self,
        namespace: &str,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<KvEntry>> {
        self.inner.range(namespace, start, end, limit).await
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<u64> {
        self.inner.clear_namespace(namespace).await
    }
}

/// A ledger over a [`FlakyStore`] reporting to a [`CapturingAlertSink`].
#[allow(dead_code)]
pub fn flaky_ledger() -> (Ledger, Faults, Arc<CapturingAlertSink>) {
    flaky_ledger_with(LedgerSettings::default())
}

/// [`flaky_ledger`] with explicit settings.
#[allow(dead_code)]
pub fn flaky_ledger_with(settings: LedgerSettings) -> (Ledger, Faults, Arc<CapturingAlertSink>) {
    let faults = Faults::default();
    let alerts = Arc::new(CapturingAlertSink::default());
    let ledger = Ledger::builder()
        .engine(FlakyStore::new(faults.clone()))
        .settings(settings)
        .alert_sink(alerts.clone())
        .build();
    (ledger, faults, alerts)
}
