//! Checkout error types.

use thiserror::Error;

use foilcraft_core::OrderId;

use crate::db::RepositoryError;
use crate::payments::PaymentError;

/// Errors from the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Request is unusable; nothing was persisted.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The processor could not open or report on a session. When `order_id`
    /// is set the order exists, is still pending, and can be retried.
    #[error("payment provider error: {source}")]
    PaymentProvider {
        order_id: Option<OrderId>,
        #[source]
        source: PaymentError,
    },

    /// The order is not in a state that allows the operation.
    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

impl CheckoutError {
    pub(crate) fn provider(order_id: OrderId, source: PaymentError) -> Self {
        Self::PaymentProvider {
            order_id: Some(order_id),
            source,
        }
    }

    pub(crate) fn order_not_found(order_id: OrderId) -> Self {
        Self::NotFound(format!("order {order_id}"))
    }
}
