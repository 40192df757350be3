//! Shopping assistant.
//!
//! Answers free-text questions with product recommendations by sending the
//! whole catalog to an OpenAI-compatible chat completions endpoint. The
//! catalog snapshot is cached for five minutes.

mod error;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, instrument};
use url::Url;

pub use error::AssistantError;
pub use prompt::CatalogEntry;

use crate::config::AssistantConfig;
use crate::db::CatalogRepository;
use error::ApiErrorResponse;

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;
const CATALOG_TTL: Duration = Duration::from_secs(300);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shown to the shopper when a reply cannot be produced.
pub const FALLBACK_MESSAGE: &str = "I'm having trouble accessing our product information. Please try again later or contact our support team.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client with a cached catalog snapshot.
#[derive(Clone)]
pub struct AssistantClient {
    inner: Arc<AssistantClientInner>,
}

struct AssistantClientInner {
    client: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
    model: String,
    catalog: Cache<(), Arc<Vec<CatalogEntry>>>,
}

impl std::fmt::Debug for AssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("model", &self.inner.model)
            .finish_non_exhaustive()
    }
}

impl AssistantClient {
    #[must_use]
    pub fn new(config: &AssistantConfig) -> Self {
        let mut endpoint = config.api_base.clone();
        if let Ok(mut segments) = endpoint.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "chat", "completions"]);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            inner: Arc::new(AssistantClientInner {
                client,
                endpoint,
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                catalog: Cache::builder()
                    .max_capacity(1)
                    .time_to_live(CATALOG_TTL)
                    .build(),
            }),
        }
    }

    /// Answer a shopper's message using the current catalog.
    ///
    /// # Errors
    ///
    /// Returns `AssistantError::Catalog` if the catalog cannot be loaded, or
    /// another variant if the completion request fails.
    #[instrument(skip(self, pool, message), fields(model = %self.inner.model))]
    pub async fn reply(&self, pool: &PgPool, message: &str) -> Result<String, AssistantError> {
        let catalog = self.catalog(pool).await?;
        let system = prompt::system_prompt(&catalog)?;
        self.complete(&system, message).await
    }

    /// Drop the cached catalog so the next reply reloads it.
    pub async fn invalidate_catalog(&self) {
        self.inner.catalog.invalidate(&()).await;
    }

    async fn catalog(&self, pool: &PgPool) -> Result<Arc<Vec<CatalogEntry>>, AssistantError> {
        self.inner
            .catalog
            .try_get_with((), async {
                let repo = CatalogRepository::new(pool);
                let products = repo.list_products(None).await?;
                let thermofoil = repo.list_thermofoil().await?;
                debug!(
                    products = products.len(),
                    thermofoil = thermofoil.len(),
                    "Loaded catalog for assistant"
                );
                Ok::<_, AssistantError>(Arc::new(prompt::catalog_entries(&products, &thermofoil)))
            })
            .await
            .map_err(|e: Arc<AssistantError>| AssistantError::Catalog(e.to_string()))
    }

    /// Send one system + user exchange and return the trimmed reply.
    ///
    /// # Errors
    ///
    /// Returns `AssistantError` if the request fails or the reply is empty.
    pub async fn complete(&self, system: &str, message: &str) -> Result<String, AssistantError> {
        let request = ChatRequest {
            model: &self.inner.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .bearer_auth(self.inner.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(handle_error_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AssistantError::Parse(format!("failed to parse completion: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(AssistantError::EmptyReply)
    }
}

async fn handle_error_status(status: StatusCode, response: reqwest::Response) -> AssistantError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        return AssistantError::RateLimited(retry_after);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status == StatusCode::UNAUTHORIZED {
        return AssistantError::Unauthorized(message);
    }

    AssistantError::Api {
        status: status.as_u16(),
        message,
    }
}
