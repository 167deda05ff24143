//! Cursor pagination across indexes and scopes.

mod common;

use common::{at, login, tenant};
use vellum_ledger::{
    AppendRequest, CrossTenantGrant, Ledger, LedgerError, LedgerQuery, QueryPage, actions,
};

async fn drain(ledger: &Ledger, mut query: LedgerQuery) -> Vec<QueryPage> {
    let mut pages = Vec::new();
    loop {
        let page = ledger.query(&query).await.unwrap();
        let next = page.next_cursor.clone();
        pages.push(page);
        match next {
            Some(cursor) => query = query.after(cursor),
            None => return pages,
        }
    }
}

#[tokio::test]
async fn test_pages_partition_the_result_set() {
    let ledger = Ledger::in_memory();
    for minute in (0..10).rev() {
        login(&ledger, "A", minute).await;
    }
    login(&ledger, "B", 3).await;

    let pages = drain(&ledger, LedgerQuery::tenant(tenant("A")).with_limit(4)).await;
    let sizes: Vec<usize> = pages.iter().map(|p| p.records.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);

    let times: Vec<_> = pages
        .iter()
        .flat_map(|p| p.records.iter().map(|r| r.occurred_at))
        .collect();
    assert_eq!(times, (0..10).map(at).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_same_occurred_at_is_ordered_by_commit() {
    let ledger = Ledger::in_memory();
    let mut receipts = Vec::new();
    for _ in 0..5 {
        receipts.push(login(&ledger, "A", 7).await);
    }

    let pages = drain(&ledger, LedgerQuery::tenant(tenant("A")).with_limit(2)).await;
    let ids: Vec<_> = pages
        .iter()
        .flat_map(|p| p.records.iter().map(|r| r.id))
        .collect();
    assert_eq!(ids.len(), 5);

    let mut expected = receipts.clone();
    expected.sort_by_key(|r| (r.recorded_at, r.record_id));
    assert_eq!(
        ids,
        expected.iter().map(|r| r.record_id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_pagination_within_time_range_and_action() {
    let ledger = Ledger::in_memory();
    for minute in 0..12u32 {
        let action = if minute.is_multiple_of(3) { "auth.logout" } else { "auth.login" };
        ledger
            .append(
                AppendRequest::new("svc", tenant("A"), action).occurred_at(at(minute)),
            )
            .await
            .unwrap();
    }

    let query = LedgerQuery::tenant(tenant("A"))
        .action("auth.login")
        .between(at(2), at(10))
        .with_limit(2);
    let times: Vec<_> = drain(&ledger, query)
        .await
        .iter()
        .flat_map(|p| p.records.iter().map(|r| r.occurred_at))
        .collect();
    assert_eq!(times, vec![at(2), at(4), at(5), at(7), at(8), at(10)]);
}

#[tokio::test]
async fn test_cross_tenant_pagination_sees_every_tenant() {
    let ledger = Ledger::in_memory();
    for (i, t) in ["A", "B", "C"].iter().enumerate() {
        for minute in 0..3u32 {
            let offset = u32::try_from(i).unwrap().saturating_mul(3);
            login(&ledger, t, minute.saturating_add(offset)).await;
        }
    }

    let grant = CrossTenantGrant::new("auditor", "incident 4411");
    let query = LedgerQuery::cross_tenant(grant).action("auth.login").with_limit(4);
    let records: Vec<_> = drain(&ledger, query)
        .await
        .into_iter()
        .flat_map(|p| p.records)
        .collect();
    assert_eq!(records.len(), 9);
    assert_eq!(
        records.iter().map(|r| r.occurred_at).collect::<Vec<_>>(),
        (0..9).map(at).collect::<Vec<_>>()
    );

    // One audit record per page read.
    let audits = ledger
        .query(
            &LedgerQuery::cross_tenant(CrossTenantGrant::new("auditor", "check"))
                .action(actions::CROSS_TENANT_QUERY),
        )
        .await
        .unwrap();
    assert_eq!(audits.records.len(), 4);
}

#[tokio::test]
async fn test_foreign_cursor_is_rejected() {
    let ledger = Ledger::in_memory();
    let err = ledger
        .query(&LedgerQuery::tenant(tenant("A")).after("definitely-not-a-cursor"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_limit_bounds() {
    let ledger = Ledger::in_memory();
    let max = ledger.settings().max_query_limit;
    for limit in [0, max.saturating_add(1)] {
        let err = ledger
            .query(&LedgerQuery::tenant(tenant("A")).with_limit(limit))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuery(_)));
    }
    assert!(
        ledger
            .query(&LedgerQuery::tenant(tenant("A")).with_limit(max))
            .await
            .is_ok()
    );
}
