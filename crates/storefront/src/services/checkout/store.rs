//! Persistence seam for the checkout flow.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use foilcraft_core::{ItemRef, OrderId, PaymentStatus, UserId};

use crate::db::{CartRepository, CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{CartEntry, CatalogItem, NewOrder, Order, SessionGuard};

/// Everything [`CheckoutService`](super::CheckoutService) reads or writes.
///
/// `transition` and `begin_session_attempt` must be atomic conditional
/// updates on `payment_status = pending`; `transition` additionally checks
/// the attached session against its [`SessionGuard`] in the same update.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    async fn resolve_items(
        &self,
        items: &[ItemRef],
    ) -> Result<HashMap<ItemRef, CatalogItem>, RepositoryError>;

    async fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>, RepositoryError>;

    /// Remove every cart entry the user has; returns the count removed.
    async fn clear_cart(&self, user_id: UserId) -> Result<u64, RepositoryError>;

    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn begin_session_attempt(&self, id: OrderId) -> Result<Option<u32>, RepositoryError>;

    async fn record_session(&self, id: OrderId, session_id: &str) -> Result<bool, RepositoryError>;

    async fn transition(
        &self,
        id: OrderId,
        to: PaymentStatus,
        guard: SessionGuard<'_>,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn mark_cart_cleared(&self, id: OrderId) -> Result<DateTime<Utc>, RepositoryError>;

    async fn orders_awaiting_cart_clear(&self, limit: u32) -> Result<Vec<Order>, RepositoryError>;

    async fn pending_orders_with_session(&self, limit: u32) -> Result<Vec<Order>, RepositoryError>;
}

/// [`CheckoutStore`] over the Postgres repositories.
#[derive(Debug, Clone)]
pub struct PgCheckoutStore {
    pool: PgPool,
}

impl PgCheckoutStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckoutStore for PgCheckoutStore {
    async fn resolve_items(
        &self,
        items: &[ItemRef],
    ) -> Result<HashMap<ItemRef, CatalogItem>, RepositoryError> {
        CatalogRepository::new(&self.pool).resolve_items(items).await
    }

    async fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>, RepositoryError> {
        CartRepository::new(&self.pool).list_for_user(user_id).await
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        CartRepository::new(&self.pool).clear_for_user(user_id).await
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).insert(order).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get(id).await
    }

    async fn begin_session_attempt(&self, id: OrderId) -> Result<Option<u32>, RepositoryError> {
        OrderRepository::new(&self.pool).begin_session_attempt(id).await
    }

    async fn record_session(&self, id: OrderId, session_id: &str) -> Result<bool, RepositoryError> {
        OrderRepository::new(&self.pool)
            .record_session(id, session_id)
            .await
    }

    async fn transition(
        &self,
        id: OrderId,
        to: PaymentStatus,
        guard: SessionGuard<'_>,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .transition(id, to, guard)
            .await
    }

    async fn mark_cart_cleared(&self, id: OrderId) -> Result<DateTime<Utc>, RepositoryError> {
        OrderRepository::new(&self.pool).mark_cart_cleared(id).await
    }

    async fn orders_awaiting_cart_clear(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .awaiting_cart_clear(limit)
            .await
    }

    async fn pending_orders_with_session(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .pending_with_session(limit)
            .await
    }
}
