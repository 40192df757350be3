//! Catalog repository: general products and thermofoil products.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::{debug, instrument};

use foilcraft_core::{ItemRef, ItemType, ProductId, ThermofoilId};

use super::RepositoryError;
use crate::models::catalog::{
    CatalogItem, NewProduct, NewThermofoil, Product, ThermofoilProduct,
};

const PRODUCT_COLUMNS: &str = "id, name, brand, category, price, selling_price, description, images, created_at, updated_at";
const THERMOFOIL_COLUMNS: &str =
    "id, name, brand, unit, price_per_unit, description, images, created_at, updated_at";

/// Repository for catalog reads and admin writes.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// General products, newest first, optionally limited to one category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_products(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM storefront.product
            WHERE $1::text IS NULL OR category = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(category)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.product
                (name, brand, category, price, selling_price, description, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.selling_price)
        .bind(&product.description)
        .bind(&product.images)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// Replace every editable field of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    #[instrument(skip(self, product), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        product: &NewProduct,
    ) -> Result<Product, RepositoryError> {
        let row: Option<Product> = sqlx::query_as(&format!(
            r"
            UPDATE storefront.product
            SET name = $2, brand = $3, category = $4, price = $5, selling_price = $6,
                description = $7, images = $8, updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.selling_price)
        .bind(&product.description)
        .bind(&product.images)
        .fetch_optional(self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound)
    }

    /// All thermofoil products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_thermofoil(&self) -> Result<Vec<ThermofoilProduct>, RepositoryError> {
        let rows = sqlx::query_as(&format!(
            "SELECT {THERMOFOIL_COLUMNS} FROM storefront.thermofoil ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_thermofoil(
        &self,
        id: ThermofoilId,
    ) -> Result<Option<ThermofoilProduct>, RepositoryError> {
        let row = sqlx::query_as(&format!(
            "SELECT {THERMOFOIL_COLUMNS} FROM storefront.thermofoil WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, item), fields(name = %item.name))]
    pub async fn create_thermofoil(
        &self,
        item: &NewThermofoil,
    ) -> Result<ThermofoilProduct, RepositoryError> {
        let row = sqlx::query_as(&format!(
            r"
            INSERT INTO storefront.thermofoil
                (name, brand, unit, price_per_unit, description, images)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {THERMOFOIL_COLUMNS}
            "
        ))
        .bind(&item.name)
        .bind(&item.brand)
        .bind(item.unit)
        .bind(item.price_per_unit)
        .bind(&item.description)
        .bind(&item.images)
        .fetch_one(self.pool)
        .await?;
        Ok(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    #[instrument(skip(self, item), fields(thermofoil_id = %id))]
    pub async fn update_thermofoil(
        &self,
        id: ThermofoilId,
        item: &NewThermofoil,
    ) -> Result<ThermofoilProduct, RepositoryError> {
        let row: Option<ThermofoilProduct> = sqlx::query_as(&format!(
            r"
            UPDATE storefront.thermofoil
            SET name = $2, brand = $3, unit = $4, price_per_unit = $5,
                description = $6, images = $7, updated_at = now()
            WHERE id = $1
            RETURNING {THERMOFOIL_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&item.name)
        .bind(&item.brand)
        .bind(item.unit)
        .bind(item.price_per_unit)
        .bind(&item.description)
        .bind(&item.images)
        .fetch_optional(self.pool)
        .await?;
        row.ok_or(RepositoryError::NotFound)
    }

    /// Whether a product or thermofoil with exactly this name exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn name_exists(&self, family: ItemType, name: &str) -> Result<bool, RepositoryError> {
        let table = match family {
            ItemType::Product => "storefront.product",
            ItemType::Thermofoil => "storefront.thermofoil",
        };
        let row: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE name = $1)"
        ))
        .bind(name)
        .fetch_one(self.pool)
        .await?;
        Ok(row.0)
    }

    /// Resolve a batch of item references to catalog items.
    ///
    /// Each family is fetched with a single `= ANY($1)` query. References
    /// with no matching row are simply absent from the returned map.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if either query fails.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn resolve_items(
        &self,
        items: &[ItemRef],
    ) -> Result<HashMap<ItemRef, CatalogItem>, RepositoryError> {
        let mut product_ids = Vec::new();
        let mut thermofoil_ids = Vec::new();
        for item in items {
            match item {
                ItemRef::Product(id) => product_ids.push(*id),
                ItemRef::Thermofoil(id) => thermofoil_ids.push(*id),
            }
        }

        let mut resolved = HashMap::with_capacity(items.len());

        if !product_ids.is_empty() {
            let rows: Vec<Product> = sqlx::query_as(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM storefront.product WHERE id = ANY($1)"
            ))
            .bind(&product_ids)
            .fetch_all(self.pool)
            .await?;
            for product in rows {
                resolved.insert(ItemRef::Product(product.id), CatalogItem::Product(product));
            }
        }

        if !thermofoil_ids.is_empty() {
            let rows: Vec<ThermofoilProduct> = sqlx::query_as(&format!(
                "SELECT {THERMOFOIL_COLUMNS} FROM storefront.thermofoil WHERE id = ANY($1)"
            ))
            .bind(&thermofoil_ids)
            .fetch_all(self.pool)
            .await?;
            for item in rows {
                resolved.insert(ItemRef::Thermofoil(item.id), CatalogItem::Thermofoil(item));
            }
        }

        debug!(requested = items.len(), resolved = resolved.len(), "Resolved catalog items");
        Ok(resolved)
    }
}
