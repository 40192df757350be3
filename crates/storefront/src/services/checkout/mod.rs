//! Checkout orchestration.
//!
//! Turns a cart into a pending order, opens a hosted payment session for it,
//! and settles the order exactly once when the processor reports an outcome.
//!
//! # Order lifecycle
//!
//! ```text
//!            succeeded
//! pending ─────────────▶ paid
//!    │
//!    └─────────────────▶ failed
//!            cancelled
//! ```
//!
//! Every transition is a compare-and-set on `pending`, so concurrent
//! webhooks, confirmations and sweeps cannot settle an order twice. Outcomes
//! reported by the browser are never trusted: [`CheckoutService::confirm_order`]
//! and [`CheckoutService::abandon_order`] ask the processor first.

mod error;
pub mod pricing;
mod store;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use foilcraft_core::{CurrencyCode, Money, OrderId, PaymentOutcome, PaymentStatus, UserId};

pub use error::CheckoutError;
pub use pricing::RequestedItem;
pub use store::{CheckoutStore, PgCheckoutStore};

use crate::models::{NewOrder, Order, SessionGuard};
use crate::payments::{
    HostedSession, PaymentEvent, PaymentGateway, SessionLine, SessionRequest, SessionState,
    SessionStatus, StripeClient,
};

/// Orders handled per sweeper tick.
pub const SWEEP_BATCH_SIZE: u32 = 50;

/// The production instantiation.
pub type StorefrontCheckout = CheckoutService<PgCheckoutStore, StripeClient>;

/// Body of `POST /api/checkout/session`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Explicit items; the stored cart is used when absent.
    #[serde(default)]
    pub items: Option<Vec<RequestedItem>>,
    pub shipping_address: String,
    pub phone_number: String,
}

/// Where to send the buyer to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub order_id: OrderId,
    pub redirect_url: String,
}

/// Result of settling an order.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub order: Order,
    /// `false` when the order was already terminal, or the outcome was for
    /// a session the order no longer uses, and nothing changed.
    pub transitioned: bool,
    /// The processor took payment for an order already marked failed.
    pub paid_after_failure: bool,
}

/// What a verified webhook event did.
#[derive(Debug, Clone)]
pub enum EventResult {
    Applied(Reconciliation),
    /// A cancellation for a session the order no longer uses.
    Superseded(Order),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub attempted: usize,
    pub cleared: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub checked: usize,
    pub paid: usize,
    pub failed: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// Checkout orchestrator.
pub struct CheckoutService<S, G> {
    store: S,
    gateway: G,
    base_url: Url,
    currency: CurrencyCode,
}

impl<S, G> std::fmt::Debug for CheckoutService<S, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService")
            .field("base_url", &self.base_url.as_str())
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl<S: CheckoutStore, G: PaymentGateway> CheckoutService<S, G> {
    /// `base_url` is the public storefront origin the processor redirects
    /// back to.
    #[must_use]
    pub const fn new(store: S, gateway: G, base_url: Url, currency: CurrencyCode) -> Self {
        Self {
            store,
            gateway,
            base_url,
            currency,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Price the items, persist a pending order and open a hosted session.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` (with nothing persisted) for an
    /// empty cart, bad quantities, blank contact fields, or items missing
    /// from the catalog. Returns `CheckoutError::PaymentProvider` carrying
    /// the order id if the order was saved but no session could be opened.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn create_checkout_session(
        &self,
        user_id: UserId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let shipping_address = required_field("shipping address", &request.shipping_address)?;
        let phone_number = required_field("phone number", &request.phone_number)?;

        let requested = match &request.items {
            Some(items) => items.clone(),
            None => self
                .store
                .cart_entries(user_id)
                .await?
                .into_iter()
                .map(|entry| RequestedItem {
                    item: entry.item,
                    quantity: entry.quantity,
                })
                .collect(),
        };
        let items = pricing::merge_items(&requested)?;

        let refs: Vec<_> = items.iter().map(|i| i.item).collect();
        let catalog = self.store.resolve_items(&refs).await?;
        let priced = pricing::price_items(&items, &catalog, self.currency)?;

        let order = self
            .store
            .insert_order(&NewOrder {
                user_id,
                lines: priced.lines,
                shipping_address: shipping_address.to_string(),
                phone_number: phone_number.to_string(),
                total_price: priced.total,
                currency: self.currency,
            })
            .await?;

        info!(order_id = %order.id, total = %order.total_price, "Created pending order");

        let session = self.open_session(&order, None).await?;
        Ok(CheckoutSession {
            order_id: order.id,
            redirect_url: session.url,
        })
    }

    /// Open a fresh hosted session for the user's existing pending order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for unknown or foreign orders and
    /// `CheckoutError::Conflict` if the order is settled, turns out to be
    /// paid, or has a payment still processing.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn retry_checkout_session(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<CheckoutSession, CheckoutError> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.payment_status.is_terminal() {
            return Err(CheckoutError::Conflict(format!(
                "order {order_id} is already {}",
                order.payment_status
            )));
        }

        let mut superseded = None;
        if let Some(session_id) = order.checkout_session_id.as_deref() {
            let state = self.retrieve(order_id, session_id).await?;
            match state.outcome() {
                Some(PaymentOutcome::Succeeded) => {
                    self.reconcile_outcome(order_id, PaymentOutcome::Succeeded)
                        .await?;
                    return Err(CheckoutError::Conflict(format!(
                        "order {order_id} has already been paid"
                    )));
                }
                Some(PaymentOutcome::Cancelled) => {}
                None if state.status == SessionStatus::Open => superseded = Some(session_id),
                None => {
                    return Err(CheckoutError::Conflict(format!(
                        "payment for order {order_id} is still processing"
                    )));
                }
            }
        }

        let session = self.open_session(&order, superseded).await?;
        Ok(CheckoutSession {
            order_id,
            redirect_url: session.url,
        })
    }

    /// Start a new session attempt for a pending order.
    ///
    /// The previous session is detached before `superseded` is expired, so
    /// the expiry event it triggers no longer matches the order.
    async fn open_session(
        &self,
        order: &Order,
        superseded: Option<&str>,
    ) -> Result<HostedSession, CheckoutError> {
        let attempt = self
            .store
            .begin_session_attempt(order.id)
            .await?
            .ok_or_else(|| {
                CheckoutError::Conflict(format!("order {} is no longer pending", order.id))
            })?;

        if let Some(old) = superseded
            && let Err(e) = self.gateway.expire_session(old).await
        {
            // Keep the old session attached so the next retry expires it.
            self.store.record_session(order.id, old).await?;
            return Err(CheckoutError::provider(order.id, e));
        }

        let request = self.session_request(order, attempt)?;
        let session = self
            .gateway
            .create_session(&request)
            .await
            .map_err(|e| {
                warn!(order_id = %order.id, attempt, error = %e, "Could not open checkout session");
                CheckoutError::provider(order.id, e)
            })?;

        if !self.store.record_session(order.id, &session.id).await? {
            if let Err(e) = self.gateway.expire_session(&session.id).await {
                warn!(order_id = %order.id, session_id = %session.id, error = %e, "Failed to expire orphaned session");
            }
            return Err(CheckoutError::Conflict(format!(
                "order {} was settled while opening a session",
                order.id
            )));
        }

        info!(order_id = %order.id, attempt, session_id = %session.id, "Opened checkout session");
        Ok(session)
    }

    fn session_request(&self, order: &Order, attempt: u32) -> Result<SessionRequest, CheckoutError> {
        let lines = order
            .lines
            .iter()
            .map(|line| {
                let unit_amount = Money::new(line.unit_price, order.currency)
                    .to_minor_units()
                    .map_err(|e| CheckoutError::Validation(e.to_string()))?;
                Ok(SessionLine {
                    name: line.display_name(),
                    unit_amount,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>, CheckoutError>>()?;

        Ok(SessionRequest {
            order_id: order.id,
            idempotency_key: idempotency_key(order.id, attempt),
            currency: order.currency,
            lines,
            success_url: landing_url(&self.base_url, "success", order.id),
            cancel_url: landing_url(&self.base_url, "cancel", order.id),
        })
    }

    /// Settle a pending order.
    ///
    /// Only the caller that wins the compare-and-set clears the cart; every
    /// other caller gets the current order with `transitioned == false`.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` if the order does not exist.
    pub async fn reconcile_outcome(
        &self,
        order_id: OrderId,
        outcome: PaymentOutcome,
    ) -> Result<Reconciliation, CheckoutError> {
        self.settle(order_id, outcome, SessionGuard::Any).await
    }

    /// [`Self::reconcile_outcome`], applied only while `guard` still holds.
    #[instrument(skip(self), fields(order_id = %order_id, outcome = %outcome))]
    async fn settle(
        &self,
        order_id: OrderId,
        outcome: PaymentOutcome,
        guard: SessionGuard<'_>,
    ) -> Result<Reconciliation, CheckoutError> {
        let Some(mut order) = self
            .store
            .transition(order_id, outcome.target_status(), guard)
            .await?
        else {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| CheckoutError::order_not_found(order_id))?;

            let paid_after_failure = outcome == PaymentOutcome::Succeeded
                && order.payment_status == PaymentStatus::Failed;
            if paid_after_failure {
                error!(
                    user_id = %order.user_id,
                    session_id = ?order.checkout_session_id,
                    total = %order.total_price,
                    "Payment succeeded for an order already marked failed; refund or fulfil manually"
                );
            } else {
                debug!(status = %order.payment_status, "Order not transitioned");
            }
            return Ok(Reconciliation {
                order,
                transitioned: false,
                paid_after_failure,
            });
        };

        info!(user_id = %order.user_id, status = %order.payment_status, "Order payment settled");

        if outcome == PaymentOutcome::Succeeded
            && let Some(at) = self.clear_cart_after_payment(&order).await
        {
            order.cart_cleared_at = Some(at);
        }

        Ok(Reconciliation {
            order,
            transitioned: true,
            paid_after_failure: false,
        })
    }

    /// Apply a verified processor event.
    ///
    /// A cancellation only fails the order while the event's session is
    /// still the one attached; otherwise the order is left alone and
    /// [`EventResult::Superseded`] is returned.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for an order this store never saw.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, order_id = %event.order_id))]
    pub async fn apply_payment_event(&self, event: &PaymentEvent) -> Result<EventResult, CheckoutError> {
        let guard = SessionGuard::for_outcome(event.outcome, Some(event.session_id.as_str()));
        let result = self.settle(event.order_id, event.outcome, guard).await?;

        if !result.transitioned && result.order.payment_status == PaymentStatus::Pending {
            info!(session_id = %event.session_id, "Ignoring cancellation of superseded session");
            return Ok(EventResult::Superseded(result.order));
        }
        Ok(EventResult::Applied(result))
    }

    /// Current order state, re-verified with the processor while pending.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for unknown or foreign orders and
    /// `CheckoutError::PaymentProvider` if the processor cannot be asked.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn confirm_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, CheckoutError> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.payment_status.is_terminal() {
            return Ok(order);
        }
        let Some(session_id) = order.checkout_session_id.as_deref() else {
            return Ok(order);
        };

        let state = self.retrieve(order_id, session_id).await?;
        match state.outcome() {
            Some(outcome) => {
                let guard = SessionGuard::for_outcome(outcome, Some(session_id));
                Ok(self.settle(order_id, outcome, guard).await?.order)
            }
            None => Ok(order),
        }
    }

    /// Give up on a pending order.
    ///
    /// A session the processor reports as paid still wins.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for unknown or foreign orders and
    /// `CheckoutError::Conflict` while a delayed payment is processing.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn abandon_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, CheckoutError> {
        let order = self.owned_order(user_id, order_id).await?;
        if order.payment_status.is_terminal() {
            return Ok(order);
        }

        let outcome = match order.checkout_session_id.as_deref() {
            None => PaymentOutcome::Cancelled,
            Some(session_id) => {
                let state = self.retrieve(order_id, session_id).await?;
                match (state.outcome(), state.status) {
                    (Some(outcome), _) => outcome,
                    (None, SessionStatus::Open) => {
                        let expired = self
                            .gateway
                            .expire_session(session_id)
                            .await
                            .map_err(|e| CheckoutError::provider(order_id, e))?;
                        expired.outcome().unwrap_or(PaymentOutcome::Cancelled)
                    }
                    (None, _) => {
                        return Err(CheckoutError::Conflict(format!(
                            "payment for order {order_id} is still processing"
                        )));
                    }
                }
            }
        };

        let guard = SessionGuard::for_outcome(outcome, order.checkout_session_id.as_deref());
        Ok(self.settle(order_id, outcome, guard).await?.order)
    }

    /// Retry cart clearing for paid orders that never recorded it.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Store` if the orders cannot be listed.
    #[instrument(skip(self))]
    pub async fn sweep_pending_cart_clears(&self, limit: u32) -> Result<SweepReport, CheckoutError> {
        let orders = self.store.orders_awaiting_cart_clear(limit).await?;
        let mut report = SweepReport {
            attempted: orders.len(),
            cleared: 0,
        };

        for order in &orders {
            if self.clear_cart_after_payment(order).await.is_some() {
                report.cleared += 1;
            }
        }

        if report.attempted > 0 {
            info!(attempted = report.attempted, cleared = report.cleared, "Swept pending cart clears");
        }
        Ok(report)
    }

    /// Re-verify pending orders that have a session against the processor.
    ///
    /// Per-order processor failures are counted, not returned.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Store` if the orders cannot be listed or
    /// updated.
    #[instrument(skip(self))]
    pub async fn sync_pending_orders(&self, limit: u32) -> Result<SyncReport, CheckoutError> {
        let orders = self.store.pending_orders_with_session(limit).await?;
        let mut report = SyncReport {
            checked: orders.len(),
            ..SyncReport::default()
        };

        for order in &orders {
            let Some(session_id) = order.checkout_session_id.as_deref() else {
                continue;
            };
            let state = match self.gateway.retrieve_session(session_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(order_id = %order.id, session_id, error = %e, "Could not verify session");
                    report.errors += 1;
                    continue;
                }
            };

            match state.outcome() {
                Some(outcome) => {
                    let guard = SessionGuard::for_outcome(outcome, Some(session_id));
                    let result = self.settle(order.id, outcome, guard).await?;
                    match (result.transitioned, outcome) {
                        (false, _) => report.unchanged += 1,
                        (true, PaymentOutcome::Succeeded) => report.paid += 1,
                        (true, PaymentOutcome::Cancelled) => report.failed += 1,
                    }
                }
                None => report.unchanged += 1,
            }
        }

        Ok(report)
    }

    async fn owned_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order, CheckoutError> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| CheckoutError::order_not_found(order_id))
    }

    async fn retrieve(&self, order_id: OrderId, session_id: &str) -> Result<SessionState, CheckoutError> {
        self.gateway
            .retrieve_session(session_id)
            .await
            .map_err(|e| CheckoutError::provider(order_id, e))
    }

    /// Empty the buyer's cart and record it. Failures are logged and left
    /// for the sweeper.
    async fn clear_cart_after_payment(&self, order: &Order) -> Option<chrono::DateTime<chrono::Utc>> {
        let removed = match self.store.clear_cart(order.user_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(order_id = %order.id, user_id = %order.user_id, error = %e, "Failed to clear cart after payment");
                return None;
            }
        };

        match self.store.mark_cart_cleared(order.id).await {
            Ok(at) => {
                debug!(order_id = %order.id, removed, "Cleared cart after payment");
                Some(at)
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "Failed to record cart clear");
                None
            }
        }
    }
}

impl<S, G> CheckoutService<S, G>
where
    S: CheckoutStore + 'static,
    G: PaymentGateway + 'static,
{
    /// Run [`Self::sweep_pending_cart_clears`] every `interval` until the
    /// runtime shuts down.
    pub fn spawn_cart_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(?interval, "Starting cart-clear sweeper");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_pending_cart_clears(SWEEP_BATCH_SIZE).await {
                    error!(error = %e, "Cart-clear sweep failed");
                }
            }
        })
    }
}

fn required_field<'a>(label: &str, value: &'a str) -> Result<&'a str, CheckoutError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CheckoutError::Validation(format!("{label} is required")));
    }
    Ok(value)
}

/// Processor idempotency key for one session attempt.
#[must_use]
pub fn idempotency_key(order_id: OrderId, attempt: u32) -> String {
    format!("order-{order_id}-attempt-{attempt}")
}

/// `{base}/checkout/{page}?order_id={id}`
#[must_use]
pub fn landing_url(base_url: &Url, page: &str, order_id: OrderId) -> Url {
    let mut url = base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["checkout", page]);
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("order_id", &order_id.to_string());
    url
}
