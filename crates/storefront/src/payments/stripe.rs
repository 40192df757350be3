//! Stripe Checkout client.
//!
//! Uses the form-encoded REST API directly: create, retrieve and expire
//! Checkout Sessions. Every call goes through [`RetryPolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use foilcraft_core::OrderId;

use super::{
    HostedSession, PaymentError, PaymentGateway, RetryPolicy, SessionPaymentStatus,
    SessionRequest, SessionState, SessionStatus,
};
use crate::config::StripeConfig;

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
/// Metadata key carrying the order id on every session.
pub const ORDER_ID_METADATA_KEY: &str = "order_id";

/// A Checkout Session object as returned by the API and embedded in events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub status: Option<SessionStatus>,
    pub payment_status: SessionPaymentStatus,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// Order id from metadata, falling back to `client_reference_id`.
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        self.metadata
            .get(ORDER_ID_METADATA_KEY)
            .or(self.client_reference_id.as_ref())
            .and_then(|raw| raw.parse().ok())
    }

    /// Convert into the processor-neutral session state.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::InvalidResponse` if the status is missing.
    pub fn into_state(self) -> Result<SessionState, PaymentError> {
        let order_id = self.order_id();
        let status = self.status.ok_or_else(|| {
            PaymentError::InvalidResponse(format!("session {} has no status", self.id))
        })?;
        Ok(SessionState {
            id: self.id,
            status,
            payment_status: self.payment_status,
            order_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
}

/// Build the form body for `POST /v1/checkout/sessions`.
///
/// # Errors
///
/// Returns `PaymentError::InvalidRequest` for an empty line list.
pub fn session_form(request: &SessionRequest) -> Result<Vec<(String, String)>, PaymentError> {
    if request.lines.is_empty() {
        return Err(PaymentError::InvalidRequest(
            "a session needs at least one line".to_string(),
        ));
    }

    let currency = request.currency.processor_code();
    let order_id = request.order_id.to_string();

    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.to_string()),
        ("cancel_url".to_string(), request.cancel_url.to_string()),
        ("client_reference_id".to_string(), order_id.clone()),
        (format!("metadata[{ORDER_ID_METADATA_KEY}]"), order_id),
    ];

    for (i, line) in request.lines.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        form.push((format!("{prefix}[price_data][currency]"), currency.to_string()));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            line.name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            line.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), line.quantity.to_string()));
    }

    Ok(form)
}

/// Stripe Checkout API client.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    api_base: Url,
    secret_key: SecretString,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.inner.api_base.as_str())
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self::with_retry_policy(config, RetryPolicy::new(config.timeout))
    }

    #[must_use]
    pub fn with_retry_policy(config: &StripeConfig, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(StripeClientInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
                retry,
            }),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PaymentError> {
        let mut url = self.inner.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| PaymentError::InvalidRequest("API base cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<CheckoutSessionObject, PaymentError> {
        let response = request
            .bearer_auth(self.inner.secret_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| PaymentError::InvalidResponse(format!("failed to parse session: {e}")))
        } else {
            Err(handle_error_status(status, response).await)
        }
    }
}

async fn handle_error_status(status: StatusCode, response: reqwest::Response) -> PaymentError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        return PaymentError::RateLimited(retry_after);
    }

    if status == StatusCode::UNAUTHORIZED {
        return PaymentError::Unauthorized;
    }

    let message = match response.text().await {
        Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api) => {
                let kind = api.error.error_type.unwrap_or_else(|| "api_error".to_string());
                let message = api.error.message.unwrap_or_default();
                format!("{kind}: {message}")
            }
            Err(_) => body,
        },
        Err(e) => e.to_string(),
    };

    PaymentError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id, key = %request.idempotency_key))]
    async fn create_session(&self, request: &SessionRequest) -> Result<HostedSession, PaymentError> {
        let url = self.endpoint(&["v1", "checkout", "sessions"])?;
        let form = session_form(request)?;

        let session = self
            .inner
            .retry
            .run("create_session", || {
                self.send_once(
                    self.inner
                        .client
                        .post(url.clone())
                        .header(IDEMPOTENCY_KEY_HEADER, &request.idempotency_key)
                        .form(&form),
                )
            })
            .await?;

        let url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse(format!("session {} has no redirect url", session.id))
        })?;
        debug!(session_id = %session.id, "Opened checkout session");

        Ok(HostedSession {
            id: session.id,
            url,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionState, PaymentError> {
        let url = self.endpoint(&["v1", "checkout", "sessions", session_id])?;

        self.inner
            .retry
            .run("retrieve_session", || {
                self.send_once(self.inner.client.get(url.clone()))
            })
            .await?
            .into_state()
    }

    #[instrument(skip(self))]
    async fn expire_session(&self, session_id: &str) -> Result<SessionState, PaymentError> {
        let url = self.endpoint(&["v1", "checkout", "sessions", session_id, "expire"])?;

        let state = self
            .inner
            .retry
            .run("expire_session", || {
                self.send_once(self.inner.client.post(url.clone()))
            })
            .await?
            .into_state()?;

        debug!(session_id, "Expired checkout session");
        Ok(state)
    }
}
