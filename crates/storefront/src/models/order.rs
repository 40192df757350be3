//! Order domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use foilcraft_core::{
    CurrencyCode, Email, ItemRef, LengthUnit, OrderId, PaymentOutcome, PaymentStatus, UserId,
};

/// A priced line, copied by value into the order at creation.
///
/// Later catalog edits never change what an order says was bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item: ItemRef,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// Set for length-priced items: the quantity counts this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_unit: Option<LengthUnit>,
    pub line_total: Decimal,
}

impl OrderLine {
    /// Label shown on the hosted payment page.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.pricing_unit {
            Some(unit) => format!("{} (per {unit})", self.name),
            None => self.name.clone(),
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: String,
    pub phone_number: String,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
    pub payment_status: PaymentStatus,
    /// Current hosted session. Older sessions of a retried order are not kept.
    #[serde(skip_serializing)]
    pub checkout_session_id: Option<String>,
    pub session_attempts: u32,
    pub cart_cleared_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a pending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: String,
    pub phone_number: String,
    pub total_price: Decimal,
    pub currency: CurrencyCode,
}

/// Order joined with the purchasing user, for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithCustomer {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub customer_email: Email,
}

/// Which hosted session a status transition must still belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionGuard<'a> {
    /// Settle regardless of the attached session.
    Any,
    /// Settle only while the order's session is exactly this one
    /// (`None` meaning no session attached).
    Current(Option<&'a str>),
}

impl<'a> SessionGuard<'a> {
    /// Guard for settling with `outcome` as reported for `session_id`.
    ///
    /// Money received always wins. A cancellation only counts for the
    /// session the order is still waiting on.
    #[must_use]
    pub const fn for_outcome(outcome: PaymentOutcome, session_id: Option<&'a str>) -> Self {
        match outcome {
            PaymentOutcome::Succeeded => Self::Any,
            PaymentOutcome::Cancelled => Self::Current(session_id),
        }
    }

    /// Whether an order with `current` attached satisfies the guard.
    #[must_use]
    pub fn admits(&self, current: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Current(expected) => *expected == current,
        }
    }
}
