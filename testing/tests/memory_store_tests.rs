//! Behavior of the in-memory registration store

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic on unexpected variants

use chrono::Duration;
use racepay_core::store::{
    CommitOutcome, HoldDisposition, HoldOutcome, RegistrationStore, ReleaseOutcome,
    SettleOutcome, Settlement, StoreError,
};
use racepay_core::types::{
    AttemptOutcome, GatewayAttempt, Gender, GroupCode, HoldLine, HoldState, HoldToken,
    InventoryKey, PaymentStatus, Size,
};
use racepay_testing::fixtures::{bank_transfer, group, runner};
use racepay_testing::mocks::epoch;
use racepay_testing::InMemoryRegistrationStore;

fn medium_female() -> InventoryKey {
    InventoryKey::new(Size::M, Gender::Female)
}

async fn store_with_held_group(code: &str, status: PaymentStatus) -> (InMemoryRegistrationStore, HoldToken) {
    let store = InMemoryRegistrationStore::new();
    store.configure_stock(medium_female(), 10).await.unwrap();
    let token = HoldToken::new();
    let outcome = store
        .hold(token, vec![HoldLine::new(medium_female(), 2)], epoch())
        .await
        .unwrap();
    assert!(matches!(outcome, HoldOutcome::Held(_)));

    let runners = vec![
        runner("V-1", Size::M, Gender::Female),
        runner("V-2", Size::M, Gender::Female),
    ];
    store
        .insert_group(group(code, token, runners, status, epoch()))
        .await
        .unwrap();
    (store, token)
}

fn settlement(code: &str, to: PaymentStatus, disposition: HoldDisposition) -> Settlement {
    Settlement {
        code: GroupCode::new(code),
        expected: PaymentStatus::OPEN.to_vec(),
        to,
        disposition,
        at: epoch() + Duration::minutes(5),
        gateway_reference: None,
    }
}

#[tokio::test]
async fn test_commit_and_release_are_idempotent() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Pending).await;

    assert_eq!(store.commit_hold(token).await.unwrap(), CommitOutcome::Committed);
    assert_eq!(store.commit_hold(token).await.unwrap(), CommitOutcome::AlreadyCommitted);
    assert_eq!(store.release_hold(token).await.unwrap(), ReleaseOutcome::AlreadyCommitted);

    let item = store.item(medium_female()).unwrap();
    assert_eq!((item.reserved, item.assigned), (0, 2));
}

#[tokio::test]
async fn test_released_hold_cannot_be_committed() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Pending).await;

    assert_eq!(store.release_hold(token).await.unwrap(), ReleaseOutcome::Released);
    assert_eq!(store.release_hold(token).await.unwrap(), ReleaseOutcome::AlreadyReleased);
    assert_eq!(store.commit_hold(token).await.unwrap(), CommitOutcome::AlreadyReleased);

    let item = store.item(medium_female()).unwrap();
    assert_eq!((item.reserved, item.assigned, item.available()), (0, 0, 10));
}

#[tokio::test]
async fn test_settle_confirms_and_commits_together() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Processing).await;
    let mut confirm = settlement("RG-1", PaymentStatus::Confirmed, HoldDisposition::Commit);
    confirm.gateway_reference = Some("REF000001".to_string());

    let outcome = store.settle(confirm).await.unwrap();

    let SettleOutcome::Settled { group, hold_state } = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert_eq!(group.status, PaymentStatus::Confirmed);
    assert_eq!(group.confirmed_at, Some(epoch() + Duration::minutes(5)));
    assert_eq!(group.gateway_reference.as_deref(), Some("REF000001"));
    assert_eq!(hold_state, HoldState::Committed);
    assert_eq!(store.hold_state(token), Some(HoldState::Committed));
    assert_eq!(store.item(medium_female()).unwrap().assigned, 2);
}

#[tokio::test]
async fn test_settle_on_terminal_group_is_stale() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Pending).await;
    store
        .settle(settlement("RG-1", PaymentStatus::Expired, HoldDisposition::Release))
        .await
        .unwrap();

    let late = store
        .settle(settlement("RG-1", PaymentStatus::Confirmed, HoldDisposition::Commit))
        .await
        .unwrap();

    assert_eq!(
        late,
        SettleOutcome::Stale {
            current: PaymentStatus::Expired
        }
    );
    assert_eq!(store.hold_state(token), Some(HoldState::Released));
    assert_eq!(store.item(medium_female()).unwrap().assigned, 0);
}

#[tokio::test]
async fn test_settle_refuses_to_commit_released_hold() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Processing).await;
    store.release_hold(token).await.unwrap();

    let outcome = store
        .settle(settlement("RG-1", PaymentStatus::Confirmed, HoldDisposition::Commit))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SettleOutcome::HoldUnavailable {
            state: HoldState::Released
        }
    );
    assert_eq!(
        store.group(&GroupCode::new("RG-1")).unwrap().status,
        PaymentStatus::Processing
    );
}

#[tokio::test]
async fn test_idempotency_key_is_freed_by_rejection() {
    let (store, _) = store_with_held_group("RG-1", PaymentStatus::Pending).await;
    let mut first = store.group(&GroupCode::new("RG-1")).unwrap();
    first.code = GroupCode::new("RG-2");
    first.idempotency_key = Some("key-abcdef".to_string());
    store.insert_group(first.clone()).await.unwrap();

    let mut second = first.clone();
    second.code = GroupCode::new("RG-3");
    assert_eq!(
        store.insert_group(second.clone()).await,
        Err(StoreError::IdempotencyConflict {
            existing: GroupCode::new("RG-2")
        })
    );

    store
        .settle(settlement("RG-2", PaymentStatus::Rejected, HoldDisposition::Release))
        .await
        .unwrap();

    assert!(store.find_live_by_idempotency_key("key-abcdef").await.unwrap().is_none());
    store.insert_group(second).await.unwrap();
    assert_eq!(
        store
            .find_live_by_idempotency_key("key-abcdef")
            .await
            .unwrap()
            .map(|g| g.code),
        Some(GroupCode::new("RG-3"))
    );
}

#[tokio::test]
async fn test_overdue_groups_oldest_first_and_open_only() {
    let store = InMemoryRegistrationStore::new();
    let runners = || vec![runner("V-1", Size::S, Gender::Male)];

    let mut late = group("RG-LATE", HoldToken::new(), runners(), PaymentStatus::Pending, epoch());
    late.reserved_until = epoch() + Duration::hours(2);
    let mut early = group("RG-EARLY", HoldToken::new(), runners(), PaymentStatus::Processing, epoch());
    early.reserved_until = epoch() + Duration::hours(1);
    let mut done = group("RG-DONE", HoldToken::new(), runners(), PaymentStatus::Confirmed, epoch());
    done.reserved_until = epoch();
    let fresh = group("RG-FRESH", HoldToken::new(), runners(), PaymentStatus::Pending, epoch());

    for g in [late, early, done, fresh] {
        store.insert_group(g).await.unwrap();
    }

    let overdue = store
        .overdue_groups(epoch() + Duration::hours(3), 10)
        .await
        .unwrap();
    let codes: Vec<_> = overdue.iter().map(|g| g.code.as_str().to_string()).collect();
    assert_eq!(codes, vec!["RG-EARLY", "RG-LATE"]);

    let limited = store.overdue_groups(epoch() + Duration::hours(3), 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_reference_exists_covers_attempts_and_live_manual_payments() {
    let (store, _) = store_with_held_group("RG-1", PaymentStatus::Pending).await;
    store
        .record_attempt(GatewayAttempt {
            reference: "REF000001".to_string(),
            group_code: GroupCode::new("RG-1"),
            raw_response: "{}".to_string(),
            normalized_error_code: None,
            outcome: AttemptOutcome::Approved,
            created_at: epoch(),
        })
        .await
        .unwrap();

    let mut manual = group(
        "RG-2",
        HoldToken::new(),
        vec![runner("V-9", Size::L, Gender::Male)],
        PaymentStatus::Pending,
        epoch(),
    );
    manual.payment_method = bank_transfer("TX-77");
    store.insert_group(manual).await.unwrap();

    assert!(store.reference_exists("REF000001").await.unwrap());
    assert!(store.reference_exists("TX-77").await.unwrap());
    assert!(!store.reference_exists("TX-78").await.unwrap());

    let duplicate = store
        .record_attempt(GatewayAttempt {
            reference: "REF000001".to_string(),
            group_code: GroupCode::new("RG-1"),
            raw_response: String::new(),
            normalized_error_code: None,
            outcome: AttemptOutcome::Rejected,
            created_at: epoch(),
        })
        .await;
    assert_eq!(
        duplicate,
        Err(StoreError::DuplicateReference("REF000001".to_string()))
    );
}

#[tokio::test]
async fn test_live_manual_reference_is_unique() {
    let store = InMemoryRegistrationStore::new();
    let manual = |code: &str| {
        let mut g = group(
            code,
            HoldToken::new(),
            vec![runner("V-1", Size::M, Gender::Female)],
            PaymentStatus::Pending,
            epoch(),
        );
        g.payment_method = bank_transfer("TX-500");
        g
    };
    store.insert_group(manual("RG-1")).await.unwrap();

    assert_eq!(
        store.insert_group(manual("RG-2")).await,
        Err(StoreError::ManualReferenceInUse("TX-500".to_string()))
    );
}

#[tokio::test]
async fn test_expired_group_frees_its_manual_reference() {
    let store = InMemoryRegistrationStore::new();
    store.configure_stock(medium_female(), 2).await.unwrap();
    let mut manual = Vec::new();
    for code in ["RG-1", "RG-2"] {
        let token = HoldToken::new();
        store
            .hold(token, vec![HoldLine::new(medium_female(), 1)], epoch())
            .await
            .unwrap();
        let mut g = group(
            code,
            token,
            vec![runner("V-1", Size::M, Gender::Female)],
            PaymentStatus::Pending,
            epoch(),
        );
        g.payment_method = bank_transfer("TX-501");
        manual.push(g);
    }
    let retry = manual.pop().unwrap();
    store.insert_group(manual.pop().unwrap()).await.unwrap();

    store
        .settle(settlement("RG-1", PaymentStatus::Expired, HoldDisposition::Release))
        .await
        .unwrap();

    store.insert_group(retry).await.unwrap();
    assert!(store.group(&GroupCode::new("RG-2")).is_some());
}

#[tokio::test]
async fn test_overdue_groups_skip_committed_holds() {
    let (store, token) = store_with_held_group("RG-1", PaymentStatus::Processing).await;
    store.commit_hold(token).await.unwrap();

    let overdue = store
        .overdue_groups(epoch() + Duration::hours(80), 10)
        .await
        .unwrap();

    assert!(overdue.is_empty());
}
