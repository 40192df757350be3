//! Integration tests for signed processor events.
//!
//! Bodies are signed the way the processor signs them, verified, parsed and
//! applied to orders held in the in-memory store.

#![allow(clippy::unwrap_used)]

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::SecretString;
use sha2::Sha256;

use foilcraft_core::{OrderId, PaymentStatus, UserId};
use foilcraft_integration_tests::{FakeGateway, MemoryStore, TestCheckout, checkout, from_cart};
use foilcraft_storefront::payments::{WebhookError, WebhookVerifier};
use foilcraft_storefront::services::checkout::{CheckoutError, EventResult};

const SECRET: &str = "whsec_integration_Qm3vT8kLp2";
const BUYER: UserId = UserId::new(510);

fn verifier() -> WebhookVerifier {
    WebhookVerifier::new(SecretString::from(SECRET))
}

fn signature(secret: &str, payload: &[u8]) -> String {
    let ts = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{ts}.").as_bytes());
    mac.update(payload);
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn body(event_type: &str, session_id: &str, payment_status: &str, order_id: OrderId) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{session_id}"),
        "object": "event",
        "type": event_type,
        "data": {"object": {
            "id": session_id,
            "object": "checkout.session",
            "status": "complete",
            "payment_status": payment_status,
            "client_reference_id": order_id.to_string(),
            "metadata": {"order_id": order_id.to_string()}
        }}
    })
    .to_string()
    .into_bytes()
}

async fn pending_order(store: &MemoryStore, service: &TestCheckout) -> OrderId {
    let door = store.add_product("Raised panel door 500", Decimal::from(180));
    store.add_to_cart(BUYER, door, 2);
    service
        .create_checkout_session(BUYER, &from_cart())
        .await
        .unwrap()
        .order_id
}

/// Verify, parse and apply a body the way `POST /webhooks/stripe` does.
async fn deliver(
    service: &TestCheckout,
    header: Option<&str>,
    payload: &[u8],
) -> Result<Option<EventResult>, String> {
    let event = verifier()
        .construct_event(header, payload)
        .map_err(|e| e.to_string())?;
    match event {
        Some(event) => service
            .apply_payment_event(&event)
            .await
            .map(Some)
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

#[tokio::test]
async fn test_signed_completion_pays_order() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let payload = body("checkout.session.completed", "cs_test_1", "paid", order_id);
    let header = signature(SECRET, &payload);
    let result = deliver(&service, Some(&header), &payload).await.unwrap();

    assert!(matches!(result, Some(EventResult::Applied(ref r)) if r.transitioned));
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Paid);
    assert!(store.cart(BUYER).is_empty());

    // The processor redelivers; nothing changes.
    let replay = deliver(&service, Some(&header), &payload).await.unwrap();
    assert!(matches!(replay, Some(EventResult::Applied(ref r)) if !r.transitioned));
    assert_eq!(store.cart_clears(), 1);
}

#[tokio::test]
async fn test_delayed_payment_waits_for_follow_up() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;

    let completed = body("checkout.session.completed", "cs_test_1", "unpaid", order_id);
    let result = deliver(&service, Some(&signature(SECRET, &completed)), &completed)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Pending);

    let failed = body(
        "checkout.session.async_payment_failed",
        "cs_test_1",
        "unpaid",
        order_id,
    );
    deliver(&service, Some(&signature(SECRET, &failed)), &failed)
        .await
        .unwrap();
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Failed);
    assert_eq!(store.cart(BUYER).len(), 1);
}

#[tokio::test]
async fn test_expiry_of_replaced_session_is_ignored() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;
    service.retry_checkout_session(BUYER, order_id).await.unwrap();

    let expired = body("checkout.session.expired", "cs_test_1", "unpaid", order_id);
    let result = deliver(&service, Some(&signature(SECRET, &expired)), &expired)
        .await
        .unwrap();

    assert!(matches!(result, Some(EventResult::Superseded(_))));
    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_forged_and_unsigned_events_rejected() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());
    let order_id = pending_order(&store, &service).await;
    let payload = body("checkout.session.completed", "cs_test_1", "paid", order_id);

    let forged = signature("whsec_not_ours", &payload);
    assert_eq!(
        verifier().construct_event(Some(&forged), &payload),
        Err(WebhookError::SignatureMismatch)
    );
    assert_eq!(
        verifier().construct_event(None, &payload),
        Err(WebhookError::MissingSignature)
    );

    let mut tampered = payload.clone();
    tampered.extend_from_slice(b" ");
    let header = signature(SECRET, &payload);
    assert!(deliver(&service, Some(&header), &tampered).await.is_err());

    assert_eq!(store.order(order_id).unwrap().payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_event_for_unknown_order() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());

    let payload = body("checkout.session.completed", "cs_live_x", "paid", OrderId::new(8080));
    let event = verifier()
        .construct_event(Some(&signature(SECRET, &payload)), &payload)
        .unwrap()
        .unwrap();

    assert!(matches!(
        service.apply_payment_event(&event).await,
        Err(CheckoutError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unrelated_event_types_acknowledged() {
    let store = MemoryStore::new();
    let service = checkout(&store, &FakeGateway::new());

    let payload = serde_json::json!({
        "id": "evt_payout",
        "type": "payout.paid",
        "data": {"object": {"id": "po_1", "object": "payout"}}
    })
    .to_string()
    .into_bytes();

    let result = deliver(&service, Some(&signature(SECRET, &payload)), &payload)
        .await
        .unwrap();
    assert!(result.is_none());
}
