//! Signed Stripe webhook events.
//!
//! <https://docs.stripe.com/webhooks#verify-manually>

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use foilcraft_core::{OrderId, PaymentOutcome};

use super::SessionPaymentStatus;
use super::stripe::CheckoutSessionObject;

/// Header carrying `t=<unix seconds>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Maximum age of a signed payload, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

const SESSION_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
const ASYNC_PAYMENT_FAILED: &str = "checkout.session.async_payment_failed";
const SESSION_EXPIRED: &str = "checkout.session.expired";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

/// A verified checkout event that settles an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub event_id: String,
    pub order_id: OrderId,
    pub session_id: String,
    pub outcome: PaymentOutcome,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// Verifies `Stripe-Signature` headers against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Check `header` against `payload` at time `now` (unix seconds).
    ///
    /// Any `v1` entry may match; Stripe sends several while a secret is
    /// being rolled.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn verify(&self, header: &str, payload: &[u8], now: i64) -> Result<(), WebhookError> {
        let mut timestamp: Option<&str> = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or(WebhookError::MalformedHeader)?;
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedHeader);
        }
        let ts: i64 = timestamp.parse().map_err(|_| WebhookError::MalformedHeader)?;

        let skew = now.checked_sub(ts).map(i64::unsigned_abs);
        if skew.is_none_or(|skew| skew > self.tolerance_secs.unsigned_abs()) {
            return Err(WebhookError::TimestampOutOfTolerance);
        }

        let expected = self.sign(timestamp, payload)?;
        if signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate))
        {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    /// Verify and parse an event body.
    ///
    /// Returns `Ok(None)` for authentic events that do not settle an order.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError` if the header is absent or invalid, or the
    /// body is not a Stripe event.
    #[instrument(skip_all)]
    pub fn construct_event(
        &self,
        header: Option<&str>,
        payload: &[u8],
    ) -> Result<Option<PaymentEvent>, WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;
        self.verify(header, payload, chrono::Utc::now().timestamp())?;
        parse_event(payload)
    }

    fn sign(&self, timestamp: &str, payload: &[u8]) -> Result<String, WebhookError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::SignatureMismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Map an already-verified event body to a [`PaymentEvent`].
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` if the body cannot be parsed.
pub fn parse_event(payload: &[u8]) -> Result<Option<PaymentEvent>, WebhookError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let handled = matches!(
        raw.event_type.as_str(),
        SESSION_COMPLETED | ASYNC_PAYMENT_SUCCEEDED | ASYNC_PAYMENT_FAILED | SESSION_EXPIRED
    );
    if !handled {
        debug!(event_id = %raw.id, event_type = %raw.event_type, "Ignoring event type");
        return Ok(None);
    }

    let session: CheckoutSessionObject = serde_json::from_value(raw.data.object)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let outcome = match raw.event_type.as_str() {
        SESSION_COMPLETED => match session.payment_status {
            SessionPaymentStatus::Paid | SessionPaymentStatus::NoPaymentRequired => {
                PaymentOutcome::Succeeded
            }
            // Delayed payment method; an async_payment_* event follows.
            SessionPaymentStatus::Unpaid => return Ok(None),
        },
        ASYNC_PAYMENT_SUCCEEDED => PaymentOutcome::Succeeded,
        _ => PaymentOutcome::Cancelled,
    };

    let Some(order_id) = session.order_id() else {
        warn!(event_id = %raw.id, session_id = %session.id, "Checkout event has no order reference");
        return Ok(None);
    };

    Ok(Some(PaymentEvent {
        event_id: raw.id,
        order_id,
        session_id: session.id,
        outcome,
    }))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
