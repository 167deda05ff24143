//! Durable ledger on `SurrealKV`: records, indexes and tamper evidence
//! survive a reopen.

#![cfg(feature = "kv")]

mod common;

use std::sync::Arc;

use common::{CapturingAlertSink, facade_ctx, login, tenant};
use vellum_ledger::{Ledger, LedgerQuery, LedgerSettings, RetentionPolicy, actions};
use vellum_storage::{KvStore, SurrealKvStore};

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");

    let (kept, target) = {
        let ledger =
            Ledger::open(&path, RetentionPolicy::default(), LedgerSettings::default()).unwrap();
        let kept = login(&ledger, "A", 1).await;
        let target = login(&ledger, "A", 2).await;
        ledger
            .mutation_gate()
            .reject_delete(&facade_ctx("ops"), &target.record_id)
            .await;
        ledger.close().await.unwrap();
        (kept, target)
    };

    let ledger =
        Ledger::open(&path, RetentionPolicy::default(), LedgerSettings::default()).unwrap();
    assert_eq!(ledger.count().await.unwrap(), 3);
    assert_eq!(
        ledger.get(&kept.record_id).await.unwrap().recorded_at,
        kept.recorded_at
    );
    assert!(ledger.get(&target.record_id).await.is_ok());

    let evidence = ledger
        .query(&LedgerQuery::tenant(tenant("A")).action(actions::TAMPERING_ATTEMPT))
        .await
        .unwrap();
    assert_eq!(evidence.records.len(), 1);
    assert_eq!(
        evidence.records.first().unwrap().resource_id,
        Some(target.record_id.to_string())
    );
}

#[tokio::test]
async fn test_reopened_store_still_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");
    let receipt = {
        let ledger =
            Ledger::open(&path, RetentionPolicy::default(), LedgerSettings::default()).unwrap();
        let receipt = login(&ledger, "A", 1).await;
        ledger.close().await.unwrap();
        receipt
    };

    let ledger =
        Ledger::open(&path, RetentionPolicy::default(), LedgerSettings::default()).unwrap();
    let raw = ledger.raw_store(facade_ctx("ops"));
    let err = raw
        .set("ledger:records", &receipt.record_id.to_string(), b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, vellum_storage::StorageError::Immutable(_)));
    assert_eq!(ledger.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_offline_damage_to_an_index_is_skipped_and_alerted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");
    let kept = {
        let ledger =
            Ledger::open(&path, RetentionPolicy::default(), LedgerSettings::default()).unwrap();
        let kept = login(&ledger, "A", 1).await;
        ledger.close().await.unwrap();
        kept
    };

    // Written behind the ledger's back while it was closed.
    let orphan = "A\u{1f}0\u{1f}0\u{1f}00000000-0000-4000-8000-000000000000".to_owned();
    {
        let engine = SurrealKvStore::open(&path).unwrap();
        engine
            .insert("ledger:idx:tenant_occurred", &orphan, b"A".to_vec())
            .await
            .unwrap();
        engine.close().await.unwrap();
    }

    let alerts = Arc::new(CapturingAlertSink::default());
    let ledger = Ledger::builder()
        .engine(SurrealKvStore::open(&path).unwrap())
        .alert_sink(alerts.clone())
        .build();
    let page = ledger
        .query(&LedgerQuery::tenant(tenant("A")))
        .await
        .unwrap();
    assert_eq!(
        page.records.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![kept.record_id]
    );
    assert_eq!(
        alerts.dangling(),
        vec![("ledger:idx:tenant_occurred".to_owned(), orphan)]
    );
}
