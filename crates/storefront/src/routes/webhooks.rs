//! Payment processor webhooks.
//!
//! The body is read raw because the signature covers the exact bytes.
//! Verified events are applied through the checkout service; anything the
//! storefront does not act on is acknowledged so the processor stops
//! resending it.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::payments::webhook::SIGNATURE_HEADER;
use crate::services::checkout::{CheckoutError, EventResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Ack {
    pub received: bool,
}

const ACK: Ack = Ack { received: true };

/// `POST /webhooks/stripe`
///
/// Bad signatures get 400. Store failures get 500 so the processor retries.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(event) = state.webhooks().construct_event(signature, &body)? else {
        return Ok(Json(ACK));
    };

    match state.checkout().apply_payment_event(&event).await {
        Ok(EventResult::Applied(reconciliation)) => {
            info!(
                event_id = %event.event_id,
                order_id = %event.order_id,
                status = %reconciliation.order.payment_status,
                transitioned = reconciliation.transitioned,
                "Webhook applied"
            );
        }
        Ok(EventResult::Superseded(order)) => {
            info!(
                event_id = %event.event_id,
                order_id = %order.id,
                session_id = %event.session_id,
                "Ignored event for a superseded session"
            );
        }
        Err(CheckoutError::NotFound(what)) => {
            warn!(event_id = %event.event_id, order = %what, "Webhook for unknown order");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Json(ACK))
}
