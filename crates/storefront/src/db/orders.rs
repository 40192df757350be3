//! Order repository.
//!
//! Payment state only moves through [`OrderRepository::transition`], a
//! conditional update on `payment_status = 'pending'`. Under concurrent
//! callers exactly one `UPDATE` matches the row; everyone else gets `None`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};

use foilcraft_core::{CurrencyCode, Email, OrderId, PaymentStatus, UserId};

use super::RepositoryError;
use crate::models::order::{NewOrder, Order, OrderLine, OrderWithCustomer, SessionGuard};

const ORDER_COLUMNS: &str = r#"o.id, o.user_id, o.lines, o.shipping_address, o.phone_number,
    o.total_price, o.currency, o.payment_status, o.checkout_session_id, o.session_attempts,
    o.cart_cleared_at, o.resolved_at, o.created_at, o.updated_at"#;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    lines: Json<Vec<OrderLine>>,
    shipping_address: String,
    phone_number: String,
    total_price: Decimal,
    currency: String,
    payment_status: PaymentStatus,
    checkout_session_id: Option<String>,
    session_attempts: i32,
    cart_cleared_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let currency = r.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", r.id))
        })?;
        let session_attempts = u32::try_from(r.session_attempts).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "order {} has negative session attempt count",
                r.id
            ))
        })?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            lines: r.lines.0,
            shipping_address: r.shipping_address,
            phone_number: r.phone_number,
            total_price: r.total_price,
            currency,
            payment_status: r.payment_status,
            checkout_session_id: r.checkout_session_id,
            session_attempts,
            cart_cleared_at: r.cart_cleared_at,
            resolved_at: r.resolved_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderWithCustomerRow {
    #[sqlx(flatten)]
    order: OrderRow,
    customer_name: String,
    customer_email: String,
}

fn limit_param(limit: u32) -> i64 {
    i64::from(limit)
}

/// Repository for orders and their payment state.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order in `pending` state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, order), fields(user_id = %order.user_id, total = %order.total_price))]
    pub async fn insert(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let row: OrderRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO storefront."order" AS o
                (user_id, lines, shipping_address, phone_number, total_price, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id)
        .bind(Json(&order.lines))
        .bind(&order.shipping_address)
        .bind(&order.phone_number)
        .bind(order.total_price)
        .bind(order.currency.as_str())
        .fetch_one(self.pool)
        .await?;

        let order = Order::try_from(row)?;
        debug!(order_id = %order.id, "Inserted pending order");
        Ok(order)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM storefront."order" o WHERE o.id = $1"#
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Start a new hosted-session attempt.
    ///
    /// Bumps the attempt counter and detaches the previous session, but only
    /// while the order is pending. Returns the new attempt number, or `None`
    /// if the order is terminal or missing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn begin_session_attempt(&self, id: OrderId) -> Result<Option<u32>, RepositoryError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE storefront."order"
            SET session_attempts = session_attempts + 1,
                checkout_session_id = NULL,
                updated_at = now()
            WHERE id = $1 AND payment_status = 'pending'
            RETURNING session_attempts
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|(n,)| {
            u32::try_from(n).map_err(|_| {
                RepositoryError::DataCorruption(format!("order {id} attempt counter overflow"))
            })
        })
        .transpose()
    }

    /// Attach a hosted session to a still-pending order.
    ///
    /// Returns `false` if the order resolved in the meantime.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn record_session(&self, id: OrderId, session_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE storefront."order"
            SET checkout_session_id = $2, updated_at = now()
            WHERE id = $1 AND payment_status = 'pending'
            "#,
        )
        .bind(id)
        .bind(session_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-set `pending -> to`, optionally pinned to the attached
    /// session.
    ///
    /// Returns the updated order if this call performed the transition, or
    /// `None` if the order is missing, no longer pending, or no longer on the
    /// session `guard` names.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if `to` is `pending`.
    #[instrument(skip(self), fields(order_id = %id, to = %to))]
    pub async fn transition(
        &self,
        id: OrderId,
        to: PaymentStatus,
        guard: SessionGuard<'_>,
    ) -> Result<Option<Order>, RepositoryError> {
        if !to.is_terminal() {
            return Err(RepositoryError::Conflict(
                "orders can only move to a terminal status".to_string(),
            ));
        }

        let (any_session, expected_session) = match guard {
            SessionGuard::Any => (true, None),
            SessionGuard::Current(session_id) => (false, session_id),
        };

        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r#"
            UPDATE storefront."order" AS o
            SET payment_status = $2, resolved_at = now(), updated_at = now()
            WHERE o.id = $1
              AND o.payment_status = 'pending'
              AND ($3 OR o.checkout_session_id IS NOT DISTINCT FROM $4)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(to)
        .bind(any_session)
        .bind(expected_session)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// Record that the buyer's cart was cleared. Keeps the first timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn mark_cart_cleared(&self, id: OrderId) -> Result<DateTime<Utc>, RepositoryError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE storefront."order"
            SET cart_cleared_at = COALESCE(cart_cleared_at, now()), updated_at = now()
            WHERE id = $1
            RETURNING cart_cleared_at
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|(at,)| at).ok_or(RepositoryError::NotFound)
    }

    /// Paid orders whose cart was never recorded as cleared, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn awaiting_cart_clear(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order" o
            WHERE o.payment_status = 'paid' AND o.cart_cleared_at IS NULL
            ORDER BY o.resolved_at, o.id
            LIMIT $1
            "#
        ))
        .bind(limit_param(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Pending orders that have a hosted session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending_with_session(&self, limit: u32) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order" o
            WHERE o.payment_status = 'pending' AND o.checkout_session_id IS NOT NULL
            ORDER BY o.created_at, o.id
            LIMIT $1
            "#
        ))
        .bind(limit_param(limit))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM storefront."order" o
            WHERE o.user_id = $1
            ORDER BY o.created_at DESC, o.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Every order with the purchasing user's name and email, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all_with_customer(&self) -> Result<Vec<OrderWithCustomer>, RepositoryError> {
        let rows: Vec<OrderWithCustomerRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ORDER_COLUMNS}, u.name AS customer_name, u.email AS customer_email
            FROM storefront."order" o
            JOIN storefront.user u ON u.id = o.user_id
            ORDER BY o.created_at DESC, o.id DESC
            "#
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let customer_email = Email::parse(&r.customer_email).map_err(|e| {
                    RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
                })?;
                Ok(OrderWithCustomer {
                    order: Order::try_from(r.order)?,
                    customer_name: r.customer_name,
                    customer_email,
                })
            })
            .collect()
    }
}
