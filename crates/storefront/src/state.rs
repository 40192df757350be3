//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::assistant::AssistantClient;
use crate::config::StorefrontConfig;
use crate::payments::{StripeClient, WebhookVerifier};
use crate::services::checkout::{PgCheckoutStore, StorefrontCheckout};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    checkout: Arc<StorefrontCheckout>,
    webhooks: WebhookVerifier,
    assistant: Option<AssistantClient>,
}

impl AppState {
    /// Build the state and every client it owns from configuration.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let checkout = Arc::new(StorefrontCheckout::new(
            PgCheckoutStore::new(pool.clone()),
            StripeClient::new(&config.stripe),
            config.base_url.clone(),
            config.currency,
        ));
        let webhooks = WebhookVerifier::new(config.stripe.webhook_secret.clone());
        let assistant = config.assistant.as_ref().map(AssistantClient::new);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                checkout,
                webhooks,
                assistant,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// The checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &Arc<StorefrontCheckout> {
        &self.inner.checkout
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookVerifier {
        &self.inner.webhooks
    }

    /// `None` when no assistant API key is configured.
    #[must_use]
    pub fn assistant(&self) -> Option<&AssistantClient> {
        self.inner.assistant.as_ref()
    }
}
