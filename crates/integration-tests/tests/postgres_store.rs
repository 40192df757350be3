//! Repository tests against a real Postgres.
//!
//! Each test gets a fresh database with the storefront migrations applied.
//! Run with `DATABASE_URL` pointing at a server the test user may create
//! databases on:
//!
//! ```bash
//! DATABASE_URL=postgres://postgres@localhost/foilcraft \
//!     cargo test -p foilcraft-integration-tests --test postgres_store -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;
use sqlx::PgPool;

use foilcraft_core::{
    CurrencyCode, Email, ItemRef, OrderId, PaymentStatus, ProductId, UserId,
};
use foilcraft_storefront::db::{CartRepository, CatalogRepository, OrderRepository, UserRepository};
use foilcraft_storefront::db::cart::MAX_QUANTITY;
use foilcraft_storefront::models::{NewOrder, NewProduct, OrderLine, SessionGuard};

async fn buyer(pool: &PgPool, email: &str) -> UserId {
    UserRepository::new(pool)
        .create_with_password("Test Buyer", &Email::parse(email).unwrap(), "$argon2id$test", None)
        .await
        .unwrap()
        .id
}

async fn pending_order(pool: &PgPool, user_id: UserId, session_id: &str) -> OrderId {
    let repo = OrderRepository::new(pool);
    let order = repo
        .insert(&NewOrder {
            user_id,
            lines: vec![OrderLine {
                item: ItemRef::Product(ProductId::new(1)),
                name: "Soft-close hinge".to_string(),
                unit_price: Decimal::from(12),
                quantity: 4,
                pricing_unit: None,
                line_total: Decimal::from(48),
            }],
            shipping_address: "14 Sawmill Lane".to_string(),
            phone_number: "0400 000 000".to_string(),
            total_price: Decimal::from(48),
            currency: CurrencyCode::AUD,
        })
        .await
        .unwrap();
    assert_eq!(repo.begin_session_attempt(order.id).await.unwrap(), Some(1));
    assert!(repo.record_session(order.id, session_id).await.unwrap());
    order.id
}

// =============================================================================
// Order Transitions
// =============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_transitions_have_one_winner(pool: PgPool) {
    let user = buyer(&pool, "race@example.com").await;
    let order_id = pending_order(&pool, user, "cs_test_race").await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        let to = if i % 2 == 0 { PaymentStatus::Paid } else { PaymentStatus::Failed };
        tasks.push(tokio::spawn(async move {
            OrderRepository::new(&pool)
                .transition(order_id, to, SessionGuard::Any)
                .await
                .unwrap()
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        if let Some(order) = task.await.unwrap() {
            winners.push(order);
        }
    }

    assert_eq!(winners.len(), 1);
    let stored = OrderRepository::new(&pool).get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, winners[0].payment_status);
    assert!(stored.resolved_at.is_some());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cancellation_for_replaced_session_leaves_order_pending(pool: PgPool) {
    let user = buyer(&pool, "retry@example.com").await;
    let order_id = pending_order(&pool, user, "cs_test_1").await;
    let repo = OrderRepository::new(&pool);

    // A retry detaches the first session and attaches a second one.
    assert_eq!(repo.begin_session_attempt(order_id).await.unwrap(), Some(2));
    let stale = repo
        .transition(order_id, PaymentStatus::Failed, SessionGuard::Current(Some("cs_test_1")))
        .await
        .unwrap();
    assert!(stale.is_none());

    assert!(repo.record_session(order_id, "cs_test_2").await.unwrap());
    let stale = repo
        .transition(order_id, PaymentStatus::Failed, SessionGuard::Current(Some("cs_test_1")))
        .await
        .unwrap();
    assert!(stale.is_none());
    let order = repo.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let current = repo
        .transition(order_id, PaymentStatus::Failed, SessionGuard::Current(Some("cs_test_2")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.payment_status, PaymentStatus::Failed);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_detached_guard_matches_null_session(pool: PgPool) {
    let user = buyer(&pool, "detached@example.com").await;
    let order_id = pending_order(&pool, user, "cs_test_1").await;
    let repo = OrderRepository::new(&pool);
    repo.begin_session_attempt(order_id).await.unwrap();

    let order = repo
        .transition(order_id, PaymentStatus::Failed, SessionGuard::Current(None))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.checkout_session_id, None);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_success_ignores_session_guard(pool: PgPool) {
    let user = buyer(&pool, "paid@example.com").await;
    let order_id = pending_order(&pool, user, "cs_test_1").await;
    let repo = OrderRepository::new(&pool);

    let paid = repo
        .transition(order_id, PaymentStatus::Paid, SessionGuard::Any)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);

    // Terminal orders never move again.
    let again = repo
        .transition(order_id, PaymentStatus::Failed, SessionGuard::Any)
        .await
        .unwrap();
    assert!(again.is_none());
    assert!(repo.begin_session_attempt(order_id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cart_cleared_keeps_first_timestamp(pool: PgPool) {
    let user = buyer(&pool, "clear@example.com").await;
    let order_id = pending_order(&pool, user, "cs_test_1").await;
    let repo = OrderRepository::new(&pool);
    repo.transition(order_id, PaymentStatus::Paid, SessionGuard::Any)
        .await
        .unwrap();

    assert_eq!(repo.awaiting_cart_clear(10).await.unwrap().len(), 1);
    let first = repo.mark_cart_cleared(order_id).await.unwrap();
    let second = repo.mark_cart_cleared(order_id).await.unwrap();

    assert_eq!(first, second);
    assert!(repo.awaiting_cart_clear(10).await.unwrap().is_empty());
}

// =============================================================================
// Cart Upsert
// =============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cart_add_accumulates_quantity(pool: PgPool) {
    let user = buyer(&pool, "cart@example.com").await;
    let repo = CartRepository::new(&pool);
    let hinge = ItemRef::Product(ProductId::new(3));

    let first = repo.add(user, hinge, 2).await.unwrap();
    let second = repo.add(user, hinge, 3).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.quantity, 5);
    assert_eq!(repo.list_for_user(user).await.unwrap().len(), 1);
    assert_eq!(repo.count(user).await.unwrap(), 5);
}

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cart_add_caps_quantity(pool: PgPool) {
    let user = buyer(&pool, "cap@example.com").await;
    let repo = CartRepository::new(&pool);
    let hinge = ItemRef::Product(ProductId::new(3));

    repo.add(user, hinge, MAX_QUANTITY - 1).await.unwrap();
    let entry = repo.add(user, hinge, 10).await.unwrap();

    assert_eq!(entry.quantity, MAX_QUANTITY);
    assert_eq!(repo.clear_for_user(user).await.unwrap(), 1);
    assert_eq!(repo.count(user).await.unwrap(), 0);
}

// =============================================================================
// Catalog
// =============================================================================

#[sqlx::test(migrations = "../storefront/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_product_listing_filters_by_category(pool: PgPool) {
    let repo = CatalogRepository::new(&pool);
    for (name, category) in [("Soft-close hinge", "hinges"), ("Drawer runner 450", "slides")] {
        repo.create_product(&NewProduct {
            name: name.to_string(),
            brand: "Blum".to_string(),
            category: category.to_string(),
            price: Decimal::from(20),
            selling_price: Decimal::from(18),
            description: String::new(),
            images: vec![],
        })
        .await
        .unwrap();
    }

    let hinges = repo.list_products(Some("hinges")).await.unwrap();
    assert_eq!(hinges.len(), 1);
    assert_eq!(hinges[0].name, "Soft-close hinge");

    assert!(repo.list_products(Some("handles")).await.unwrap().is_empty());
    assert_eq!(repo.list_products(None).await.unwrap().len(), 2);
}
