//! Confirmation delivery: retries, pending flag, manual resend and shutdown.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap

mod common;

use common::{World, medium_female, request, runner_input};
use racepay_core::types::{GroupCode, PaymentStatus};
use racepay_registration::NotifyError;
use racepay_registration::notifier::CONFIRMATION_TEMPLATE;
use racepay_testing::fixtures::{bank_transfer, mobile_payment};
use racepay_testing::{RecordingDispatcher, Step};
use tokio::sync::watch;

async fn confirm_one(world: &World, reference: &str) -> GroupCode {
    let receipt = world
        .orchestrator
        .register_and_pay(request(
            vec![runner_input(reference, medium_female())],
            bank_transfer(reference),
        ))
        .await
        .unwrap();
    assert_eq!(receipt.status, PaymentStatus::Confirmed);
    receipt.group_code
}

/// Run the worker until everything queued so far is delivered.
async fn drain(world: &mut World) {
    let (_stop, stopped) = watch::channel(true);
    world.worker.take().unwrap().run(stopped).await;
}

#[tokio::test]
async fn transient_failures_are_retried_until_delivered() {
    let mut world = World::with_dispatcher(
        vec![],
        &[(medium_female(), 5)],
        RecordingDispatcher::failing_first(2),
    )
    .await;
    let code = confirm_one(&world, "TRX-1").await;

    drain(&mut world).await;

    assert_eq!(world.dispatcher.attempts(), 3);
    let sent = world.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].template, CONFIRMATION_TEMPLATE);
    assert!(!world.store.group(&code).unwrap().notification_pending);
}

#[tokio::test]
async fn undeliverable_confirmation_is_flagged_without_touching_payment() {
    let mut world = World::with_dispatcher(
        vec![],
        &[(medium_female(), 5)],
        RecordingDispatcher::rejecting(),
    )
    .await;
    let code = confirm_one(&world, "TRX-1").await;

    drain(&mut world).await;

    // Rejections are permanent, so no retries
    assert_eq!(world.dispatcher.attempts(), 1);
    let group = world.store.group(&code).unwrap();
    assert_eq!(group.status, PaymentStatus::Confirmed);
    assert!(group.notification_pending);
    assert_eq!(world.store.item(medium_female()).unwrap().assigned, 1);
}

#[tokio::test]
async fn three_failures_are_followed_by_a_fourth_send() {
    let mut world = World::with_dispatcher(
        vec![],
        &[(medium_female(), 5)],
        RecordingDispatcher::failing_first(3),
    )
    .await;
    let code = confirm_one(&world, "TRX-1").await;

    drain(&mut world).await;

    assert_eq!(world.dispatcher.attempts(), 4);
    assert_eq!(world.dispatcher.sent().len(), 1);
    assert!(!world.store.group(&code).unwrap().notification_pending);
}

#[tokio::test]
async fn manual_resend_clears_the_flag() {
    let mut world = World::with_dispatcher(
        vec![],
        &[(medium_female(), 5)],
        RecordingDispatcher::failing_first(4),
    )
    .await;
    let code = confirm_one(&world, "TRX-1").await;
    drain(&mut world).await;
    assert!(world.store.group(&code).unwrap().notification_pending);

    world.notifier.resend(&code).await.unwrap();

    assert_eq!(world.dispatcher.sent().len(), 1);
    assert!(!world.store.group(&code).unwrap().notification_pending);
}

#[tokio::test]
async fn failed_resend_reports_attempts_and_keeps_the_flag() {
    let world = World::with_dispatcher(
        vec![],
        &[(medium_female(), 5)],
        RecordingDispatcher::failing_first(10),
    )
    .await;
    let code = confirm_one(&world, "TRX-1").await;

    let err = world.notifier.resend(&code).await.unwrap_err();

    match err {
        NotifyError::Undelivered { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {other}"),
    }
    assert!(world.store.group(&code).unwrap().notification_pending);
}

#[tokio::test]
async fn resend_requires_a_confirmed_group() {
    let world = World::new(
        vec![Step::rejected(422, "DECLINED", "insufficient funds")],
        &[(medium_female(), 5)],
    )
    .await;
    let rejected = world
        .orchestrator
        .register_and_pay(request(
            vec![runner_input("V-1", medium_female())],
            mobile_payment(),
        ))
        .await
        .unwrap();

    let not_confirmed = world.notifier.resend(&rejected.group_code).await.unwrap_err();
    let missing = world.notifier.resend(&GroupCode::new("RG-MISSING")).await.unwrap_err();

    assert!(matches!(
        not_confirmed,
        NotifyError::NotConfirmed { status: PaymentStatus::Rejected, .. }
    ));
    assert!(matches!(missing, NotifyError::GroupNotFound(_)));
    assert_eq!(world.dispatcher.attempts(), 0);
}

#[tokio::test]
async fn queued_confirmations_are_drained_on_shutdown() {
    let mut world = World::new(vec![], &[(medium_female(), 5)]).await;
    let codes = [
        confirm_one(&world, "TRX-1").await,
        confirm_one(&world, "TRX-2").await,
        confirm_one(&world, "TRX-3").await,
    ];

    drain(&mut world).await;

    let delivered: Vec<_> = world
        .dispatcher
        .sent()
        .into_iter()
        .map(|message| message.payload["group_code"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<_> = codes.iter().map(|code| code.as_str().to_string()).collect();
    assert_eq!(delivered, expected);
}

#[tokio::test]
async fn stopped_worker_leaves_confirmations_flagged() {
    let mut world = World::new(vec![], &[(medium_female(), 5)]).await;
    drop(world.worker.take());

    let code = confirm_one(&world, "TRX-1").await;

    let group = world.store.group(&code).unwrap();
    assert_eq!(group.status, PaymentStatus::Confirmed);
    assert!(group.notification_pending);
    assert_eq!(world.dispatcher.attempts(), 0);
}
