//! Checkout route handlers.
//!
//! The buyer is redirected to the processor's hosted page and comes back to
//! one of the landing routes. Landing never trusts the redirect itself: the
//! order is re-verified with the processor before anything is reported.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use foilcraft_core::{OrderId, PaymentStatus};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::routes::ApiResponse;
use crate::services::checkout::{CheckoutRequest, CheckoutSession};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LandingQuery {
    pub order_id: OrderId,
}

/// What the landing pages report back.
#[derive(Debug, Serialize)]
pub struct LandingView {
    pub order: Order,
    /// Follow-up actions while the order is still pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<PendingActions>,
}

#[derive(Debug, Serialize)]
pub struct PendingActions {
    pub retry_url: String,
    pub cancel_url: String,
}

impl LandingView {
    fn new(order: Order) -> Self {
        let actions = (order.payment_status == PaymentStatus::Pending).then(|| PendingActions {
            retry_url: format!("/api/checkout/orders/{}/session", order.id),
            cancel_url: format!("/api/checkout/orders/{}/cancel", order.id),
        });
        Self { order, actions }
    }
}

/// Create a pending order from the cart (or explicit items) and open a
/// hosted payment session for it.
#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn create_session(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutSession>>)> {
    let session = state
        .checkout()
        .create_checkout_session(user.id, &request)
        .await?;
    let order_id = session.order_id.to_string();
    add_breadcrumb(
        "checkout",
        "Opened checkout session",
        Some(&[("order_id", order_id.as_str())]),
    );
    Ok((StatusCode::CREATED, ApiResponse::ok(session)))
}

/// Open a new hosted session for an order that is still pending.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn retry_session(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<ApiResponse<CheckoutSession>>> {
    let session = state.checkout().retry_checkout_session(user.id, id).await?;
    Ok(ApiResponse::ok(session))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn confirm(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<ApiResponse<Order>>> {
    let order = state.checkout().confirm_order(user.id, id).await?;
    Ok(ApiResponse::ok(order))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<ApiResponse<Order>>> {
    let order = state.checkout().abandon_order(user.id, id).await?;
    Ok(ApiResponse::ok(order))
}

/// Landing after the processor reports success.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn success_landing(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<LandingQuery>,
) -> Result<Json<ApiResponse<LandingView>>> {
    let order = state
        .checkout()
        .confirm_order(user.id, query.order_id)
        .await?;
    Ok(ApiResponse::ok(LandingView::new(order)))
}

/// Landing after the buyer backs out of the hosted page.
///
/// The order is left pending so it can be retried; a session that was paid
/// anyway is still picked up here.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel_landing(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<LandingQuery>,
) -> Result<Json<ApiResponse<LandingView>>> {
    let order = state
        .checkout()
        .confirm_order(user.id, query.order_id)
        .await?;
    Ok(ApiResponse::ok(LandingView::new(order)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use foilcraft_core::{CurrencyCode, UserId};

    use super::*;

    fn order(status: PaymentStatus) -> Order {
        Order {
            id: OrderId::new(12),
            user_id: UserId::new(4),
            lines: vec![],
            shipping_address: "1 Mill Rd".to_string(),
            phone_number: "555-0100".to_string(),
            total_price: Decimal::from(250),
            currency: CurrencyCode::USD,
            payment_status: status,
            checkout_session_id: Some("cs_test_1".to_string()),
            session_attempts: 1,
            cart_cleared_at: None,
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_pending_landing_offers_actions() {
        let view = serde_json::to_value(LandingView::new(order(PaymentStatus::Pending))).unwrap();
        assert_eq!(
            view["actions"]["retry_url"],
            "/api/checkout/orders/12/session"
        );
        assert!(view["order"].get("checkout_session_id").is_none());
    }

    #[test]
    fn test_settled_landing_has_no_actions() {
        let view = serde_json::to_value(LandingView::new(order(PaymentStatus::Paid))).unwrap();
        assert!(view.get("actions").is_none());
        assert_eq!(view["order"]["payment_status"], "paid");
    }

    #[test]
    fn test_landing_query_parses() {
        let query: LandingQuery = serde_json::from_str(r#"{"order_id": 9}"#).unwrap();
        assert_eq!(query.order_id, OrderId::new(9));
    }
}
