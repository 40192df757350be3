//! HTTP route handlers for storefront.
//!
//! Every response is JSON. Successes are wrapped as
//! `{ "success": true, "data": ... }`; failures come from
//! [`AppError`](crate::error::AppError).
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness (registered in main)
//! GET  /health/ready           - DB readiness (registered in main)
//!
//! # Auth (rate limited)
//! POST /api/auth/sign-up       - Create a USER account
//! POST /api/auth/sign-in       - Sign in, sets the session cookie
//! POST /api/auth/logout        - Clear the session
//!
//! # Users
//! GET  /api/users/me           - Current user
//!
//! # Catalog
//! GET  /api/products           - Product listing (?category=hinges)
//! GET  /api/products/{id}      - Product detail
//! GET  /api/thermofoil         - Thermofoil listing
//! GET  /api/thermofoil/{id}    - Thermofoil detail
//!
//! # Cart (requires auth)
//! GET    /api/cart             - Cart lines with populated items
//! POST   /api/cart             - Add item (upsert)
//! DELETE /api/cart             - Clear cart
//! GET    /api/cart/count       - Total quantity
//! PATCH  /api/cart/{entry_id}  - Set quantity
//! DELETE /api/cart/{entry_id}  - Remove entry
//!
//! # Checkout (requires auth)
//! POST /api/checkout/session              - Create order + hosted session
//! POST /api/checkout/orders/{id}/session  - New session for a pending order
//! POST /api/checkout/orders/{id}/confirm  - Re-verify with the processor
//! POST /api/checkout/orders/{id}/cancel   - Abandon a pending order
//! GET  /checkout/success?order_id=N       - Processor redirect landing
//! GET  /checkout/cancel?order_id=N        - Processor redirect landing
//! POST /webhooks/stripe                   - Signed processor events
//!
//! # Orders (requires auth)
//! GET  /api/orders             - Current user's orders
//!
//! # Assistant (rate limited)
//! POST /api/chat               - Shopping assistant
//!
//! # Admin (requires ADMIN)
//! GET  /api/admin/users               - All users
//! GET  /api/admin/orders              - All orders with customer details
//! POST /api/admin/products            - Create product
//! PUT  /api/admin/products/{id}       - Update product
//! POST /api/admin/thermofoil          - Create thermofoil
//! PUT  /api/admin/thermofoil/{id}     - Update thermofoil
//! ```

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod chat;
pub mod checkout;
pub mod orders;
pub mod users;
pub mod webhooks;

use axum::{
    Json, Router,
    routing::{get, patch, post, put},
};
use serde::Serialize;

use crate::middleware::{auth_rate_limiter, chat_rate_limiter};
use crate::state::AppState;

/// Success envelope shared by every JSON handler.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub const fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-in", post(auth::sign_in))
        .route("/logout", post(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::list_products))
        .route("/{id}", get(catalog::get_product))
}

/// Create the thermofoil routes router.
pub fn thermofoil_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(catalog::list_thermofoil))
        .route("/{id}", get(catalog::get_thermofoil))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/count", get(cart::count))
        .route("/{entry_id}", patch(cart::update).delete(cart::remove))
}

/// Create the checkout API routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(checkout::create_session))
        .route("/orders/{id}/session", post(checkout::retry_session))
        .route("/orders/{id}/confirm", post(checkout::confirm))
        .route("/orders/{id}/cancel", post(checkout::cancel))
}

/// Create the processor redirect landing routes.
pub fn landing_routes() -> Router<AppState> {
    Router::new()
        .route("/success", get(checkout::success_landing))
        .route("/cancel", get(checkout::cancel_landing))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(users::list_all))
        .route("/orders", get(orders::list_all))
        .route("/products", post(catalog::create_product))
        .route("/products/{id}", put(catalog::update_product))
        .route("/thermofoil", post(catalog::create_thermofoil))
        .route("/thermofoil/{id}", put(catalog::update_thermofoil))
}

/// Create the assistant routes router.
pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(chat::chat))
        .layer(chat_rate_limiter())
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes())
        .route("/api/users/me", get(users::me))
        .nest("/api/products", product_routes())
        .nest("/api/thermofoil", thermofoil_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/checkout", checkout_routes())
        .route("/api/orders", get(orders::list_mine))
        .nest("/api/chat", chat_routes())
        .nest("/api/admin", admin_routes())
        .nest("/checkout", landing_routes())
        .route("/webhooks/stripe", post(webhooks::stripe))
}
