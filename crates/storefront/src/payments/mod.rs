//! Hosted payment sessions.
//!
//! The checkout flow talks to the processor only through [`PaymentGateway`],
//! so tests can substitute a fake. [`stripe::StripeClient`] is the production
//! implementation and [`webhook::WebhookVerifier`] authenticates inbound
//! events.

pub mod stripe;
pub mod webhook;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use foilcraft_core::{CurrencyCode, OrderId, PaymentOutcome};

pub use stripe::StripeClient;
pub use webhook::{PaymentEvent, WebhookError, WebhookVerifier};

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processor request timed out")]
    Timeout,

    #[error("could not reach payment processor: {0}")]
    Connect(String),

    #[error("payment processor rate limited, retry after {0} seconds")]
    RateLimited(u64),

    #[error("payment processor rejected credentials")]
    Unauthorized,

    #[error("payment processor error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected payment processor response: {0}")]
    InvalidResponse(String),

    #[error("invalid session request: {0}")]
    InvalidRequest(String),
}

impl PaymentError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized | Self::InvalidResponse(_) | Self::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::Connect(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Connect(e.to_string())
        }
    }
}

/// One line on the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionLine {
    pub name: String,
    /// Unit price in minor units (cents).
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Everything needed to open a hosted session for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub order_id: OrderId,
    /// Stable per attempt, so a retried request cannot open two sessions.
    pub idempotency_key: String,
    pub currency: CurrencyCode,
    pub lines: Vec<SessionLine>,
    pub success_url: Url,
    pub cancel_url: Url,
}

/// A newly opened hosted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSession {
    pub id: String,
    /// Where to send the buyer.
    pub url: String,
}

/// Lifecycle status of a hosted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
}

/// Payment status of a hosted session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Verified state of a hosted session as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub id: String,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    /// Order the session was opened for, from its metadata.
    pub order_id: Option<OrderId>,
}

impl SessionState {
    /// The settled outcome, or `None` while the buyer can still pay.
    ///
    /// A completed session with an unpaid asynchronous payment method is
    /// still undecided; the processor sends a follow-up event.
    #[must_use]
    pub const fn outcome(&self) -> Option<PaymentOutcome> {
        match (self.status, self.payment_status) {
            (_, SessionPaymentStatus::Paid | SessionPaymentStatus::NoPaymentRequired) => {
                Some(PaymentOutcome::Succeeded)
            }
            (SessionStatus::Expired, SessionPaymentStatus::Unpaid) => {
                Some(PaymentOutcome::Cancelled)
            }
            (SessionStatus::Open | SessionStatus::Complete, SessionPaymentStatus::Unpaid) => None,
        }
    }
}

/// The hosted-checkout operations the storefront needs from a processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted session.
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession, PaymentError>;

    /// Fetch the current state of a session.
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionState, PaymentError>;

    /// Expire an open session so it can no longer be paid.
    async fn expire_session(&self, session_id: &str) -> Result<SessionState, PaymentError>;
}

/// Timeout and backoff for processor calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Base delay before the single retry; up to the same again is added as jitter.
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backoff: Duration::from_millis(250),
        }
    }

    fn jittered_backoff(&self) -> Duration {
        let max_jitter = u64::try_from(self.backoff.as_millis()).unwrap_or(u64::MAX);
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter)
        };
        self.backoff + Duration::from_millis(jitter)
    }

    /// Run `call` under the timeout, retrying once after a jittered backoff
    /// if the first failure is transient.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, PaymentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PaymentError>>,
    {
        match self.attempt(call()).await {
            Err(e) if e.is_transient() => {
                let delay = self.jittered_backoff();
                warn!(operation, error = %e, delay = ?delay, "Retrying payment processor call");
                tokio::time::sleep(delay).await;
                self.attempt(call()).await
            }
            other => other,
        }
    }

    async fn attempt<T>(
        &self,
        fut: impl Future<Output = Result<T, PaymentError>>,
    ) -> Result<T, PaymentError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| PaymentError::Timeout)?
    }
}
