//! Integration tests for settling orders.
//!
//! An order leaves `pending` exactly once, whichever of the webhook, the
//! landing page or the sync command gets there first, and the buyer's cart
//! is cleared exactly once when it was paid.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use rust_decimal::Decimal;

use foilcraft_core::{LengthUnit, OrderId, PaymentOutcome, PaymentStatus, UserId};
use foilcraft_integration_tests::{FakeGateway, MemoryStore, TestCheckout, checkout, from_cart};
use foilcraft_storefront::payments::PaymentEvent;
use foilcraft_storefront::services::checkout::{CheckoutError, EventResult};

const BUYER: UserId = UserId::new(700);

async fn pending_order(store: &MemoryStore, service: &TestCheckout) -> OrderId {
    let door = store.add_product("Slab door 450", Decimal::from(100));
    let foil = store.add_thermofoil("Gloss White", LengthUnit::Feet, Decimal::from(50));
    store.add_to_cart(BUYER, door, 2);
    store.add_to_cart(BUYER, foil, 1);
    service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap()
        .order_id
}

fn event(order_id: OrderId, session_id: &str, outcome: PaymentOutcome) -> PaymentEvent {
    PaymentEvent {
        event_id: format!("evt_{session_id}_{outcome}"),
        order_id,
        session_id: session_id.to_string(),
        outcome,
    }
}

// =============================================================================
// Outcomes
// =============================================================================

#[tokio::test]
async fn test_success_pays_and_clears_cart() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let result = service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();

    assert!(result.transitioned);
    assert_eq!(result.order.payment_status, PaymentStatus::Paid);
    assert!(result.order.resolved_at.is_some());
    assert!(result.order.cart_cleared_at.is_some());
    assert!(store.cart(BUYER).is_empty());
}

#[tokio::test]
async fn test_cancel_fails_and_keeps_cart() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let result = service
        .reconcile_outcome(order_id, PaymentOutcome::Cancelled)
        .await
        .unwrap();

    assert!(result.transitioned);
    assert_eq!(result.order.payment_status, PaymentStatus::Failed);
    assert_eq!(result.order.cart_cleared_at, None);
    assert_eq!(store.cart(BUYER).len(), 2);
    assert_eq!(store.cart_clears(), 0);
}

#[tokio::test]
async fn test_duplicate_success_clears_once() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let first = service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();

    // The buyer starts a new cart before the duplicate arrives.
    let hinge = store.add_product("Soft-close hinge", Decimal::from(8));
    store.add_to_cart(BUYER, hinge, 4);

    let second = service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();

    assert!(first.transitioned);
    assert!(!second.transitioned);
    assert_eq!(second.order.payment_status, PaymentStatus::Paid);
    assert_eq!(store.cart_clears(), 1);
    assert_eq!(store.cart(BUYER).len(), 1);
}

#[tokio::test]
async fn test_terminal_states_are_final() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());

    let paid = pending_order(&store, &service).await;
    service
        .reconcile_outcome(paid, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    let late_cancel = service
        .reconcile_outcome(paid, PaymentOutcome::Cancelled)
        .await
        .unwrap();
    assert!(!late_cancel.transitioned);
    assert_eq!(late_cancel.order.payment_status, PaymentStatus::Paid);

    let failed = pending_order(&store, &service).await;
    service
        .reconcile_outcome(failed, PaymentOutcome::Cancelled)
        .await
        .unwrap();
    let late_success = service
        .reconcile_outcome(failed, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    assert!(!late_success.transitioned);
    assert_eq!(late_success.order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_unknown_order_not_found() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());

    let err = service
        .reconcile_outcome(OrderId::new(4242), PaymentOutcome::Succeeded)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::NotFound(_)));
}

#[tokio::test]
async fn test_settling_one_order_leaves_other_carts() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let neighbour = UserId::new(701);
    let handle = store.add_product("Bar handle 128mm", Decimal::from(12));
    store.add_to_cart(neighbour, handle, 6);

    service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();

    assert!(store.cart(BUYER).is_empty());
    assert_eq!(store.cart(neighbour).len(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outcomes_have_one_winner() {
    let store = MemoryStore::new();
    let service = Arc::new(checkout(&store, &FakeGateway::new()));
    let order_id = pending_order(&store, &service).await;

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&service);
            let outcome = if i % 2 == 0 {
                PaymentOutcome::Succeeded
            } else {
                PaymentOutcome::Cancelled
            };
            tokio::spawn(async move { service.reconcile_outcome(order_id, outcome).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.transitioned {
            winners.push(result.order.payment_status);
        }
    }

    assert_eq!(winners.len(), 1);
    let settled = store.order(order_id).unwrap();
    assert_eq!(settled.payment_status, winners[0]);
    let expected_clears = usize::from(settled.payment_status == PaymentStatus::Paid);
    assert_eq!(store.cart_clears(), expected_clears);
}

// =============================================================================
// Events and Confirmation
// =============================================================================

#[tokio::test]
async fn test_cancel_event_for_superseded_session_ignored() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;

    // Retrying expires cs_test_1, whose expiry event arrives afterwards.
    service.retry_checkout_session(BUYER, order_id).await.unwrap();

    let result = service
        .apply_payment_event(&event(order_id, "cs_test_1", PaymentOutcome::Cancelled))
        .await
        .unwrap();

    assert!(matches!(result, EventResult::Superseded(_)));
    assert_eq!(
        store.order(order_id).unwrap().payment_status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_cancel_event_for_current_session_fails_order() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let result = service
        .apply_payment_event(&event(order_id, "cs_test_1", PaymentOutcome::Cancelled))
        .await
        .unwrap();

    let EventResult::Applied(reconciliation) = result else {
        panic!("expected the cancellation to apply");
    };
    assert_eq!(reconciliation.order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_success_event_from_old_session_still_pays() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;
    service.retry_checkout_session(BUYER, order_id).await.unwrap();

    let result = service
        .apply_payment_event(&event(order_id, "cs_test_1", PaymentOutcome::Succeeded))
        .await
        .unwrap();

    assert!(matches!(
        result,
        EventResult::Applied(ref r) if r.order.payment_status == PaymentStatus::Paid
    ));
}

#[tokio::test]
async fn test_confirm_asks_processor() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;

    let unpaid = service.confirm_order(BUYER, order_id).await.unwrap();
    assert_eq!(unpaid.payment_status, PaymentStatus::Pending);

    gateway.pay("cs_test_1");
    let paid = service.confirm_order(BUYER, order_id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert!(store.cart(BUYER).is_empty());
}

#[tokio::test]
async fn test_confirm_sees_lapsed_session() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;

    gateway.lapse("cs_test_1");
    let order = service.confirm_order(BUYER, order_id).await.unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(store.cart(BUYER).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stale_lapse_cannot_fail_retried_order() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = Arc::new(checkout(&store, &gateway));
    let order_id = pending_order(&store, &service).await;
    gateway.lapse("cs_test_1");

    // The landing page reads the lapsed session, then stalls.
    let mut held = gateway.hold_next_retrieve();
    let confirming = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.confirm_order(BUYER, order_id).await })
    };
    held.reached().await;

    // Meanwhile the buyer retries and gets a fresh session.
    service.retry_checkout_session(BUYER, order_id).await.unwrap();
    held.release();

    let confirmed = confirming.await.unwrap().unwrap();
    assert_eq!(confirmed.payment_status, PaymentStatus::Pending);
    let order = store.order(order_id).unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_2"));

    gateway.pay("cs_test_2");
    let result = service
        .apply_payment_event(&event(order_id, "cs_test_2", PaymentOutcome::Succeeded))
        .await
        .unwrap();
    assert!(matches!(result, EventResult::Applied(ref r) if r.transitioned));
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_cancel_event_while_session_detached_ignored() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;

    // A retry whose session creation failed leaves nothing attached.
    gateway.fail_next_creates(1);
    assert!(service.retry_checkout_session(BUYER, order_id).await.is_err());
    assert_eq!(store.order(order_id).unwrap().checkout_session_id, None);

    let result = service
        .apply_payment_event(&event(order_id, "cs_test_1", PaymentOutcome::Cancelled))
        .await
        .unwrap();

    assert!(matches!(result, EventResult::Superseded(_)));
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_payment_after_failure_is_flagged() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let service = checkout(&store, &gateway);
    let order_id = pending_order(&store, &service).await;
    service.abandon_order(BUYER, order_id).await.unwrap();

    // A delayed payment method clears after the buyer gave up.
    let result = service
        .apply_payment_event(&event(order_id, "cs_test_1", PaymentOutcome::Succeeded))
        .await
        .unwrap();

    let EventResult::Applied(reconciliation) = result else {
        panic!("expected the success to be reported");
    };
    assert!(!reconciliation.transitioned);
    assert!(reconciliation.paid_after_failure);
    assert_eq!(reconciliation.order.payment_status, PaymentStatus::Failed);
    assert_eq!(store.cart_clears(), 0);
}

#[tokio::test]
async fn test_duplicate_success_is_not_flagged() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();
    let again = service
        .reconcile_outcome(order_id, PaymentOutcome::Succeeded)
        .await
        .unwrap();

    assert!(!again.paid_after_failure);
}
