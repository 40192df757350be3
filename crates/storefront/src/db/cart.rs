//! Cart repository.
//!
//! Every statement is scoped by `user_id`, so a caller can only ever see or
//! change the requesting user's rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use foilcraft_core::{CartEntryId, ItemRef, ItemType, UserId};

use super::RepositoryError;
use super::catalog::CatalogRepository;
use crate::models::cart::{CartEntry, CartLine};

/// Upper bound on a single entry's quantity.
pub const MAX_QUANTITY: u32 = 999;

const ENTRY_COLUMNS: &str = "id, user_id, item_type, item_id, quantity, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CartEntryRow {
    id: CartEntryId,
    user_id: UserId,
    item_type: ItemType,
    item_id: i32,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartEntryRow> for CartEntry {
    type Error = RepositoryError;

    fn try_from(r: CartEntryRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(r.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "cart entry {} has negative quantity {}",
                r.id, r.quantity
            ))
        })?;
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            item: ItemRef::from_parts(r.item_type, r.item_id),
            quantity,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn quantity_param(quantity: u32) -> i32 {
    i32::try_from(quantity.min(MAX_QUANTITY)).unwrap_or(i32::MAX)
}

/// Repository for per-user cart entries.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<CartEntry>, RepositoryError> {
        let rows: Vec<CartEntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM storefront.cart_entry WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartEntry::try_from).collect()
    }

    /// The user's entries with catalog items populated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    pub async fn list_lines(&self, user_id: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let entries = self.list_for_user(user_id).await?;
        let refs: Vec<ItemRef> = entries.iter().map(|e| e.item).collect();
        let mut catalog = CatalogRepository::new(self.pool).resolve_items(&refs).await?;

        Ok(entries
            .into_iter()
            .map(|entry| CartLine {
                catalog_item: catalog.remove(&entry.item),
                entry,
            })
            .collect())
    }

    /// Add an item, incrementing the quantity if the user already has it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    #[instrument(skip(self), fields(user_id = %user_id, item = %item))]
    pub async fn add(
        &self,
        user_id: UserId,
        item: ItemRef,
        quantity: u32,
    ) -> Result<CartEntry, RepositoryError> {
        let row: CartEntryRow = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.cart_entry (user_id, item_type, item_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, item_type, item_id) DO UPDATE
            SET quantity = LEAST(storefront.cart_entry.quantity + EXCLUDED.quantity, $5),
                updated_at = now()
            RETURNING {ENTRY_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(item.item_type())
        .bind(item.raw_id())
        .bind(quantity_param(quantity))
        .bind(quantity_param(MAX_QUANTITY))
        .fetch_one(self.pool)
        .await?;

        CartEntry::try_from(row)
    }

    /// Set an entry's quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entry does not belong to the user.
    #[instrument(skip(self), fields(user_id = %user_id, entry_id = %entry_id))]
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        entry_id: CartEntryId,
        quantity: u32,
    ) -> Result<CartEntry, RepositoryError> {
        let row: Option<CartEntryRow> = sqlx::query_as(&format!(
            r"
            UPDATE storefront.cart_entry
            SET quantity = $3, updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING {ENTRY_COLUMNS}
            "
        ))
        .bind(entry_id)
        .bind(user_id)
        .bind(quantity_param(quantity))
        .fetch_optional(self.pool)
        .await?;

        row.map_or(Err(RepositoryError::NotFound), CartEntry::try_from)
    }

    /// Delete one entry.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entry does not belong to the user.
    pub async fn delete(&self, user_id: UserId, entry_id: CartEntryId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM storefront.cart_entry WHERE id = $1 AND user_id = $2",
        )
        .bind(entry_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove every entry the user has. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.cart_entry WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        debug!(removed = result.rows_affected(), "Cleared cart");
        Ok(result.rows_affected())
    }

    /// Total quantity across the user's entries.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, user_id: UserId) -> Result<i64, RepositoryError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM storefront.cart_entry WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(row.0)
    }
}
