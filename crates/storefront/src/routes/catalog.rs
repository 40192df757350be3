//! Catalog route handlers.
//!
//! Reads are public. Writes are admin-only and drop the assistant's cached
//! catalog so its recommendations follow the change.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{info, instrument};

use foilcraft_core::{ItemType, ProductId, ThermofoilId};

use crate::db::CatalogRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, NewThermofoil, Product, ThermofoilProduct};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
}

impl ProductQuery {
    /// The requested category, trimmed. Blank means no filter.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Products, newest first. `?category=` narrows to one category.
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<Product>>>> {
    let products = CatalogRepository::new(state.pool())
        .list_products(query.category())
        .await?;
    Ok(ApiResponse::ok(products))
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<ApiResponse<Product>>> {
    let product = CatalogRepository::new(state.pool())
        .get_product(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id} not found")))?;
    Ok(ApiResponse::ok(product))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, name = %body.name))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>)> {
    body.validate().map_err(AppError::BadRequest)?;
    let repo = CatalogRepository::new(state.pool());
    if repo.name_exists(ItemType::Product, &body.name).await? {
        return Err(AppError::Conflict(format!(
            "a product named {} already exists",
            body.name
        )));
    }

    let product = repo.create_product(&body).await?;
    info!(product_id = %product.id, "Product created");
    catalog_changed(&state).await;
    Ok((StatusCode::CREATED, ApiResponse::ok(product)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(body): Json<NewProduct>,
) -> Result<Json<ApiResponse<Product>>> {
    body.validate().map_err(AppError::BadRequest)?;
    let product = CatalogRepository::new(state.pool())
        .update_product(id, &body)
        .await?;
    info!(product_id = %product.id, "Product updated");
    catalog_changed(&state).await;
    Ok(ApiResponse::ok(product))
}

/// All thermofoil products, newest first.
#[instrument(skip(state))]
pub async fn list_thermofoil(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ThermofoilProduct>>>> {
    let items = CatalogRepository::new(state.pool()).list_thermofoil().await?;
    Ok(ApiResponse::ok(items))
}

#[instrument(skip(state))]
pub async fn get_thermofoil(
    State(state): State<AppState>,
    Path(id): Path<ThermofoilId>,
) -> Result<Json<ApiResponse<ThermofoilProduct>>> {
    let item = CatalogRepository::new(state.pool())
        .get_thermofoil(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("thermofoil product {id} not found")))?;
    Ok(ApiResponse::ok(item))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, name = %body.name))]
pub async fn create_thermofoil(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<NewThermofoil>,
) -> Result<(StatusCode, Json<ApiResponse<ThermofoilProduct>>)> {
    body.validate().map_err(AppError::BadRequest)?;
    let repo = CatalogRepository::new(state.pool());
    if repo.name_exists(ItemType::Thermofoil, &body.name).await? {
        return Err(AppError::Conflict(format!(
            "a thermofoil product named {} already exists",
            body.name
        )));
    }

    let item = repo.create_thermofoil(&body).await?;
    info!(thermofoil_id = %item.id, "Thermofoil product created");
    catalog_changed(&state).await;
    Ok((StatusCode::CREATED, ApiResponse::ok(item)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_thermofoil(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ThermofoilId>,
    Json(body): Json<NewThermofoil>,
) -> Result<Json<ApiResponse<ThermofoilProduct>>> {
    body.validate().map_err(AppError::BadRequest)?;
    let item = CatalogRepository::new(state.pool())
        .update_thermofoil(id, &body)
        .await?;
    info!(thermofoil_id = %item.id, "Thermofoil product updated");
    catalog_changed(&state).await;
    Ok(ApiResponse::ok(item))
}

async fn catalog_changed(state: &AppState) {
    if let Some(assistant) = state.assistant() {
        assistant.invalidate_catalog().await;
    }
}
