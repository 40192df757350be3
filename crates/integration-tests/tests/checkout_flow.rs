//! Integration tests for order creation and session attempts.
//!
//! Covers pricing a stored cart into a pending order, validation that must
//! leave nothing behind, and retrying a session on the same order.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;

use foilcraft_core::{ItemRef, LengthUnit, OrderId, PaymentStatus, UserId};
use foilcraft_integration_tests::{FakeGateway, MemoryStore, checkout, from_cart};
use foilcraft_storefront::services::checkout::{CheckoutError, CheckoutRequest, RequestedItem};

const BUYER: UserId = UserId::new(900);

/// A cart with two doors at 100 and one metre of oak foil at 50.
fn stocked_cart(store: &MemoryStore) -> (ItemRef, ItemRef) {
    let door = store.add_product("Shaker door 600", Decimal::from(100));
    let foil = store.add_thermofoil("Natural Oak", LengthUnit::Meter, Decimal::from(50));
    store.add_to_cart(BUYER, door, 2);
    store.add_to_cart(BUYER, foil, 1);
    (door, foil)
}

// =============================================================================
// Order Creation
// =============================================================================

#[tokio::test]
async fn test_cart_becomes_pending_order() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);

    let session = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();

    let order = store.order(session.order_id).unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.total_price, Decimal::from(250));
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.session_attempts, 1);
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_1"));
    assert!(session.redirect_url.ends_with("cs_test_1"));

    // The cart stays until the processor confirms payment.
    assert_eq!(store.cart(BUYER).len(), 2);
}

#[tokio::test]
async fn test_session_request_in_minor_units() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);

    let session = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();

    let requests = gateway.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.order_id, session.order_id);
    assert_eq!(
        request.idempotency_key,
        format!("order-{}-attempt-1", session.order_id)
    );

    let charged: i64 = request
        .lines
        .iter()
        .map(|l| l.unit_amount * i64::from(l.quantity))
        .sum();
    assert_eq!(charged, 25_000);

    assert_eq!(request.success_url.path(), "/checkout/success");
    assert_eq!(request.cancel_url.path(), "/checkout/cancel");
    assert_eq!(
        request.success_url.query(),
        Some(format!("order_id={}", session.order_id).as_str())
    );
}

#[tokio::test]
async fn test_explicit_items_ignore_stored_cart() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let (door, _) = stocked_cart(&store);

    let request = CheckoutRequest {
        items: Some(vec![RequestedItem {
            item: door,
            quantity: 3,
        }]),
        ..from_cart()
    };
    let session = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &request)
        .await
        .unwrap();

    let order = store.order(session.order_id).unwrap();
    assert_eq!(order.total_price, Decimal::from(300));
    assert_eq!(order.lines.len(), 1);
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_empty_cart_rejected() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();

    let err = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(_)));
    assert_eq!(store.order_count(), 0);
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn test_deleted_item_rejected_without_order() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    let (_, foil) = stocked_cart(&store);
    store.remove_item(foil);

    let err = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ref m) if m.contains("no longer available")));
    assert_eq!(store.order_count(), 0);
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn test_blank_contact_fields_rejected() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);

    let request = CheckoutRequest {
        phone_number: "   ".to_string(),
        ..from_cart()
    };
    let err = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &request)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(ref m) if m.contains("phone number")));
    assert_eq!(store.order_count(), 0);
}

// =============================================================================
// Provider Failure and Retry
// =============================================================================

#[tokio::test]
async fn test_provider_failure_keeps_pending_order() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    gateway.fail_next_creates(1);

    let err = checkout(&store, &gateway)
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap_err();

    let CheckoutError::PaymentProvider {
        order_id: Some(order_id),
        ..
    } = err
    else {
        panic!("expected a provider error with an order id, got {err:?}");
    };

    let order = store.order(order_id).unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.checkout_session_id, None);
    assert_eq!(store.cart(BUYER).len(), 2);
}

#[tokio::test]
async fn test_retry_reuses_order_with_new_attempt() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    gateway.fail_next_creates(1);
    let service = checkout(&store, &gateway);

    let Err(CheckoutError::PaymentProvider {
        order_id: Some(order_id),
        ..
    }) = service.create_checkout_session(BUYER, &from_cart()).await
    else {
        panic!("expected a provider error");
    };

    let retried = service
        .retry_checkout_session(BUYER, order_id)
        .await
        .unwrap();

    assert_eq!(retried.order_id, order_id);
    assert_eq!(store.order_count(), 1);
    let requests = gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].idempotency_key,
        format!("order-{order_id}-attempt-2")
    );
    assert_eq!(store.order(order_id).unwrap().session_attempts, 2);
}

#[tokio::test]
async fn test_retry_expires_open_session() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();
    service
        .retry_checkout_session(BUYER, first.order_id)
        .await
        .unwrap();

    assert_eq!(gateway.expired(), vec!["cs_test_1".to_string()]);
    let order = store.order(first.order_id).unwrap();
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_2"));
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_retry_keeps_old_session_when_expire_fails() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();
    gateway.fail_next_expires(1);

    let err = service
        .retry_checkout_session(BUYER, first.order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::PaymentProvider { .. }));
    assert_eq!(gateway.requests().len(), 1);
    let order = store.order(first.order_id).unwrap();
    assert_eq!(order.checkout_session_id.as_deref(), Some("cs_test_1"));
}

#[tokio::test]
async fn test_retry_of_paid_session_settles_instead() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();
    gateway.pay("cs_test_1");

    let err = service
        .retry_checkout_session(BUYER, first.order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Conflict(_)));
    assert_eq!(
        store.order(first.order_id).unwrap().payment_status,
        PaymentStatus::Paid
    );
    assert!(store.cart(BUYER).is_empty());
    assert_eq!(gateway.requests().len(), 1);
}

#[tokio::test]
async fn test_retry_of_processing_payment_refused() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();
    gateway.submit_delayed_payment("cs_test_1");

    let err = service
        .retry_checkout_session(BUYER, first.order_id)
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Conflict(ref m) if m.contains("processing")));
    assert!(gateway.expired().is_empty());
}

#[tokio::test]
async fn test_foreign_order_is_not_found() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();

    let stranger = UserId::new(901);
    assert!(matches!(
        service.retry_checkout_session(stranger, first.order_id).await,
        Err(CheckoutError::NotFound(_))
    ));
    assert!(matches!(
        service.confirm_order(stranger, first.order_id).await,
        Err(CheckoutError::NotFound(_))
    ));
    assert!(matches!(
        service.abandon_order(BUYER, OrderId::new(99_999)).await,
        Err(CheckoutError::NotFound(_))
    ));
}

// =============================================================================
// Abandon
// =============================================================================

#[tokio::test]
async fn test_abandon_expires_session_and_fails_order() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();

    let order = service.abandon_order(BUYER, first.order_id).await.unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(gateway.expired(), vec!["cs_test_1".to_string()]);
    assert_eq!(store.cart(BUYER).len(), 2);
}

#[tokio::test]
async fn test_abandon_cannot_beat_a_payment() {
    let store = MemoryStore::new();
    let gateway = FakeGateway::new();
    stocked_cart(&store);
    let service = checkout(&store, &gateway);

    let first = service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap();
    gateway.pay("cs_test_1");

    let order = service.abandon_order(BUYER, first.order_id).await.unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(gateway.expired().is_empty());
}
