//! Integration tests for Foilcraft.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p foilcraft-integration-tests
//! ```
//!
//! No database or network is needed: the checkout service runs against
//! [`MemoryStore`] and [`FakeGateway`], which follow the same conditional
//! update rules as the Postgres repositories and Stripe.
//!
//! # Test Categories
//!
//! - `checkout_flow` - Order creation, pricing, sessions and retries
//! - `reconciliation` - Outcome application, idempotency, races
//! - `maintenance` - Cart-clear sweeper and pending-order sync
//! - `webhooks` - Signed events end to end

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use url::Url;

use foilcraft_core::{
    CartEntryId, CurrencyCode, ItemRef, LengthUnit, OrderId, PaymentStatus, ProductId,
    ThermofoilId, UserId,
};
use foilcraft_storefront::db::RepositoryError;
use foilcraft_storefront::models::{
    CartEntry, CatalogItem, NewOrder, Order, Product, SessionGuard, ThermofoilProduct,
};
use foilcraft_storefront::payments::{
    HostedSession, PaymentError, PaymentGateway, SessionPaymentStatus, SessionRequest,
    SessionState, SessionStatus,
};
use foilcraft_storefront::services::checkout::{CheckoutRequest, CheckoutService, CheckoutStore};

/// Checkout service wired to the in-memory fixtures.
pub type TestCheckout = CheckoutService<MemoryStore, FakeGateway>;

/// Build a checkout service over clones of `store` and `gateway`.
///
/// # Panics
///
/// Only if the constant base URL stops parsing.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn checkout(store: &MemoryStore, gateway: &FakeGateway) -> TestCheckout {
    CheckoutService::new(
        store.clone(),
        gateway.clone(),
        Url::parse("https://shop.example.test").unwrap(),
        CurrencyCode::AUD,
    )
}

/// Check out whatever is in the buyer's stored cart.
#[must_use]
pub fn from_cart() -> CheckoutRequest {
    CheckoutRequest {
        items: None,
        shipping_address: "12 Joinery Lane, Geelong VIC 3220".to_string(),
        phone_number: "0400 123 456".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take one unit from an injected-failure counter.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
struct StoreState {
    catalog: HashMap<ItemRef, CatalogItem>,
    carts: Vec<CartEntry>,
    orders: BTreeMap<OrderId, Order>,
    next_id: i32,
    cart_clears: usize,
}

impl StoreState {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`CheckoutStore`].
///
/// Clones share state, so a test can keep a handle for assertions after
/// handing one to the service.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    clear_failures: Arc<AtomicU32>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a general product selling at `price`.
    pub fn add_product(&self, name: &str, price: Decimal) -> ItemRef {
        let mut state = lock(&self.state);
        let id = ProductId::new(state.next_id());
        let product = Product {
            id,
            name: name.to_string(),
            brand: "Blum".to_string(),
            category: "hardware".to_string(),
            price,
            selling_price: price,
            description: String::new(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state
            .catalog
            .insert(ItemRef::Product(id), CatalogItem::Product(product));
        ItemRef::Product(id)
    }

    /// Add a thermofoil product at `price` per `unit`.
    pub fn add_thermofoil(&self, name: &str, unit: LengthUnit, price: Decimal) -> ItemRef {
        let mut state = lock(&self.state);
        let id = ThermofoilId::new(state.next_id());
        let item = ThermofoilProduct {
            id,
            name: name.to_string(),
            brand: "Polytec".to_string(),
            unit,
            price_per_unit: price,
            description: String::new(),
            images: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        state
            .catalog
            .insert(ItemRef::Thermofoil(id), CatalogItem::Thermofoil(item));
        ItemRef::Thermofoil(id)
    }

    /// Delete an item from the catalog, leaving cart entries dangling.
    pub fn remove_item(&self, item: ItemRef) {
        lock(&self.state).catalog.remove(&item);
    }

    /// Upsert a cart entry, as `POST /api/cart` does.
    pub fn add_to_cart(&self, user_id: UserId, item: ItemRef, quantity: u32) {
        let mut state = lock(&self.state);
        if let Some(entry) = state
            .carts
            .iter_mut()
            .find(|e| e.user_id == user_id && e.item == item)
        {
            entry.quantity += quantity;
            return;
        }
        let id = CartEntryId::new(state.next_id());
        state.carts.push(CartEntry {
            id,
            user_id,
            item,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    #[must_use]
    pub fn cart(&self, user_id: UserId) -> Vec<CartEntry> {
        lock(&self.state)
            .carts
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        lock(&self.state).orders.get(&id).cloned()
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Number of successful cart clears so far.
    #[must_use]
    pub fn cart_clears(&self) -> usize {
        lock(&self.state).cart_clears
    }

    /// Make the next `n` cart clears fail.
    pub fn fail_next_cart_clears(&self, n: u32) {
        self.clear_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckoutStore for MemoryStore {
    async fn resolve_items(
        &self,
        items: &[ItemRef],
    ) -> Result<HashMap<ItemRef, CatalogItem>, RepositoryError> {
        let state = lock(&self.state);
        Ok(items
            .iter()
            .filter_map(|item| state.catalog.get(item).map(|c| (*item, c.clone())))
            .collect())
    }

    async fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>, RepositoryError> {
        Ok(self.cart(user_id))
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        if take_failure(&self.clear_failures) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut state = lock(&self.state);
        let before = state.carts.len();
        state.carts.retain(|e| e.user_id != user_id);
        state.cart_clears += 1;
        Ok(u64::try_from(before - state.carts.len()).unwrap_or(u64::MAX))
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut state = lock(&self.state);
        let id = OrderId::new(state.next_id());
        let now = Utc::now();
        let order = Order {
            id,
            user_id: order.user_id,
            lines: order.lines.clone(),
            shipping_address: order.shipping_address.clone(),
            phone_number: order.phone_number.clone(),
            total_price: order.total_price,
            currency: order.currency,
            payment_status: PaymentStatus::Pending,
            checkout_session_id: None,
            session_attempts: 0,
            cart_cleared_at: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.order(id))
    }

    async fn begin_session_attempt(&self, id: OrderId) -> Result<Option<u32>, RepositoryError> {
        let mut state = lock(&self.state);
        Ok(state
            .orders
            .get_mut(&id)
            .filter(|o| o.payment_status == PaymentStatus::Pending)
            .map(|order| {
                order.session_attempts += 1;
                order.checkout_session_id = None;
                order.updated_at = Utc::now();
                order.session_attempts
            }))
    }

    async fn record_session(&self, id: OrderId, session_id: &str) -> Result<bool, RepositoryError> {
        let mut state = lock(&self.state);
        Ok(state
            .orders
            .get_mut(&id)
            .filter(|o| o.payment_status == PaymentStatus::Pending)
            .map(|order| {
                order.checkout_session_id = Some(session_id.to_string());
                order.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn transition(
        &self,
        id: OrderId,
        to: PaymentStatus,
        guard: SessionGuard<'_>,
    ) -> Result<Option<Order>, RepositoryError> {
        if !to.is_terminal() {
            return Err(RepositoryError::Conflict(
                "orders can only move to a terminal status".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        Ok(state
            .orders
            .get_mut(&id)
            .filter(|o| {
                o.payment_status == PaymentStatus::Pending
                    && guard.admits(o.checkout_session_id.as_deref())
            })
            .map(|order| {
                let now = Utc::now();
                order.payment_status = to;
                order.resolved_at = Some(now);
                order.updated_at = now;
                order.clone()
            }))
    }

    async fn mark_cart_cleared(&self, id: OrderId) -> Result<DateTime<Utc>, RepositoryError> {
        let mut state = lock(&self.state);
        let order = state.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        Ok(*order.cart_cleared_at.get_or_insert_with(Utc::now))
    }

    async fn orders_awaiting_cart_clear(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        let state = lock(&self.state);
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.payment_status == PaymentStatus::Paid && o.cart_cleared_at.is_none())
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.resolved_at, o.id));
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn pending_orders_with_session(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        let state = lock(&self.state);
        Ok(state
            .orders
            .values()
            .filter(|o| o.payment_status == PaymentStatus::Pending && o.checkout_session_id.is_some())
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// =============================================================================
// FakeGateway
// =============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    sessions: HashMap<String, SessionState>,
    requests: Vec<SessionRequest>,
    expired: Vec<String>,
    held_retrieve: Option<RetrieveHold>,
}

#[derive(Debug)]
struct RetrieveHold {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Test-side handle for a paused `retrieve_session` call.
#[derive(Debug)]
pub struct HeldRetrieve {
    reached: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl HeldRetrieve {
    /// Wait until the held call has read the session and is paused.
    ///
    /// # Panics
    ///
    /// If the gateway is dropped before any retrieve happens.
    #[allow(clippy::unwrap_used)]
    pub async fn reached(&mut self) {
        (&mut self.reached).await.unwrap();
    }

    /// Let the paused call return.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// In-memory [`PaymentGateway`] with the processor's session lifecycle.
#[derive(Debug, Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
    create_failures: Arc<AtomicU32>,
    expire_failures: Arc<AtomicU32>,
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` session creations fail with a 503.
    pub fn fail_next_creates(&self, n: u32) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` expiries fail with a 503.
    pub fn fail_next_expires(&self, n: u32) {
        self.expire_failures.store(n, Ordering::SeqCst);
    }

    /// Pause the next `retrieve_session` after it has read the session,
    /// until the returned handle is released.
    #[must_use]
    pub fn hold_next_retrieve(&self) -> HeldRetrieve {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        lock(&self.state).held_retrieve = Some(RetrieveHold {
            reached: reached_tx,
            release: release_rx,
        });
        HeldRetrieve {
            reached: reached_rx,
            release: release_tx,
        }
    }

    /// The buyer paid on the hosted page.
    pub fn pay(&self, session_id: &str) {
        self.update(session_id, SessionStatus::Complete, SessionPaymentStatus::Paid);
    }

    /// The buyer submitted a delayed payment method that has not cleared.
    pub fn submit_delayed_payment(&self, session_id: &str) {
        self.update(session_id, SessionStatus::Complete, SessionPaymentStatus::Unpaid);
    }

    /// The session timed out unpaid.
    pub fn lapse(&self, session_id: &str) {
        self.update(session_id, SessionStatus::Expired, SessionPaymentStatus::Unpaid);
    }

    fn update(&self, session_id: &str, status: SessionStatus, payment_status: SessionPaymentStatus) {
        if let Some(session) = lock(&self.state).sessions.get_mut(session_id) {
            session.status = status;
            session.payment_status = payment_status;
        }
    }

    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<SessionState> {
        lock(&self.state).sessions.get(session_id).cloned()
    }

    /// Every create request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SessionRequest> {
        lock(&self.state).requests.clone()
    }

    /// Session ids expired through the API, in order.
    #[must_use]
    pub fn expired(&self) -> Vec<String> {
        lock(&self.state).expired.clone()
    }

    fn unavailable() -> PaymentError {
        PaymentError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession, PaymentError> {
        if take_failure(&self.create_failures) {
            return Err(Self::unavailable());
        }
        let mut state = lock(&self.state);
        state.requests.push(request.clone());
        let id = format!("cs_test_{}", state.requests.len());
        state.sessions.insert(
            id.clone(),
            SessionState {
                id: id.clone(),
                status: SessionStatus::Open,
                payment_status: SessionPaymentStatus::Unpaid,
                order_id: Some(request.order_id),
            },
        );
        Ok(HostedSession {
            url: format!("https://checkout.stripe.test/c/pay/{id}"),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionState, PaymentError> {
        let state = self.session(session_id).ok_or_else(|| PaymentError::Api {
            status: 404,
            message: format!("No such checkout.session: '{session_id}'"),
        });

        let hold = lock(&self.state).held_retrieve.take();
        if let Some(hold) = hold {
            let _ = hold.reached.send(());
            let _ = hold.release.await;
        }
        state
    }

    async fn expire_session(&self, session_id: &str) -> Result<SessionState, PaymentError> {
        if take_failure(&self.expire_failures) {
            return Err(Self::unavailable());
        }
        let mut state = lock(&self.state);
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: format!("No such checkout.session: '{session_id}'"),
            })?;
        if session.status != SessionStatus::Open {
            return Err(PaymentError::Api {
                status: 400,
                message: "Only Checkout Sessions with a status of open can be expired".to_string(),
            });
        }
        session.status = SessionStatus::Expired;
        let expired = session.clone();
        state.expired.push(session_id.to_string());
        Ok(expired)
    }
}
