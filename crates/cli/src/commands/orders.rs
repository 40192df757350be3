//! Checkout maintenance commands.
//!
//! # Usage
//!
//! ```bash
//! # Settle pending orders whose webhook never arrived
//! fc-cli orders sync --limit 200
//!
//! # Clear carts for paid orders whose clear failed
//! fc-cli orders sweep-carts
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string
//! - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET` - as for the storefront
//! - `STOREFRONT_BASE_URL` - Only used to build the service (default: <http://localhost:3000>)
//! - `STOREFRONT_CURRENCY` - Charge currency (default: AUD)

use foilcraft_core::CurrencyCode;
use foilcraft_storefront::config::{ConfigError, StripeConfig};
use foilcraft_storefront::payments::StripeClient;
use foilcraft_storefront::services::checkout::{CheckoutError, PgCheckoutStore, StorefrontCheckout};
use thiserror::Error;
use url::Url;

use super::{CommandError, connect};

#[derive(Debug, Error)]
pub enum OrderCommandError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid {0}: {1}")]
    InvalidSetting(&'static str, String),

    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),
}

async fn checkout_service() -> Result<StorefrontCheckout, OrderCommandError> {
    let pool = connect().await?;
    let stripe = StripeConfig::from_env()?;

    let base_url = std::env::var("STOREFRONT_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let base_url = Url::parse(&base_url)
        .map_err(|e| OrderCommandError::InvalidSetting("STOREFRONT_BASE_URL", e.to_string()))?;
    let currency = std::env::var("STOREFRONT_CURRENCY")
        .unwrap_or_else(|_| "AUD".to_string())
        .parse::<CurrencyCode>()
        .map_err(|e| OrderCommandError::InvalidSetting("STOREFRONT_CURRENCY", e.to_string()))?;

    Ok(StorefrontCheckout::new(
        PgCheckoutStore::new(pool),
        StripeClient::new(&stripe),
        base_url,
        currency,
    ))
}

/// Ask Stripe about pending orders and apply what it reports.
///
/// # Errors
///
/// Returns `OrderCommandError` if configuration is missing or the store
/// fails. Per-order processor errors are counted, not returned.
pub async fn sync(limit: u32) -> Result<(), OrderCommandError> {
    let checkout = checkout_service().await?;
    let report = checkout.sync_pending_orders(limit).await?;

    tracing::info!("Sync complete!");
    tracing::info!("  Checked: {}", report.checked);
    tracing::info!("  Paid: {}", report.paid);
    tracing::info!("  Failed: {}", report.failed);
    tracing::info!("  Unchanged: {}", report.unchanged);
    if report.errors > 0 {
        tracing::warn!("  Could not verify: {}", report.errors);
    }
    Ok(())
}

/// Retry cart clearing for paid orders.
///
/// # Errors
///
/// Returns `OrderCommandError` if configuration is missing or the store
/// fails.
pub async fn sweep_carts(limit: u32) -> Result<(), OrderCommandError> {
    let checkout = checkout_service().await?;
    let report = checkout.sweep_pending_cart_clears(limit).await?;

    tracing::info!(
        "Cart sweep complete! Cleared {} of {} orders",
        report.cleared,
        report.attempted
    );
    Ok(())
}
