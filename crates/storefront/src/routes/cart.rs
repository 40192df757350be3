//! Cart route handlers.
//!
//! Carts live in the database, one entry per (user, item). Every handler is
//! scoped to the signed-in user; another user's entry ids resolve to 404.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use foilcraft_core::{CartEntryId, ItemRef};

use crate::db::cart::MAX_QUANTITY;
use crate::db::{CartRepository, CatalogRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{CartEntry, CartLine};
use crate::routes::ApiResponse;
use crate::state::AppState;

const fn default_quantity() -> u32 {
    1
}

/// Body for `POST /api/cart`.
///
/// ```json
/// { "item": { "type": "thermofoil", "id": 3 }, "quantity": 2 }
/// ```
#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub item: ItemRef,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    pub quantity: u32,
}

#[derive(Debug, Serialize)]
pub struct CartCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct CartCleared {
    pub removed: u64,
}

fn check_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "quantity must be between 1 and {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

/// The cart with each entry's catalog item populated.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ApiResponse<Vec<CartLine>>>> {
    let lines = CartRepository::new(state.pool()).list_lines(user.id).await?;
    Ok(ApiResponse::ok(lines))
}

/// Add an item, or increase its quantity if already present.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddToCart>,
) -> Result<Json<ApiResponse<CartEntry>>> {
    check_quantity(body.quantity)?;

    let known = CatalogRepository::new(state.pool())
        .resolve_items(&[body.item])
        .await?;
    if !known.contains_key(&body.item) {
        return Err(AppError::NotFound(format!("{} not found", body.item)));
    }

    let entry = CartRepository::new(state.pool())
        .add(user.id, body.item, body.quantity)
        .await?;
    debug!(entry_id = %entry.id, quantity = entry.quantity, "Added to cart");
    Ok(ApiResponse::ok(entry))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(entry_id): Path<CartEntryId>,
    Json(body): Json<UpdateQuantity>,
) -> Result<Json<ApiResponse<CartEntry>>> {
    check_quantity(body.quantity)?;
    let entry = CartRepository::new(state.pool())
        .update_quantity(user.id, entry_id, body.quantity)
        .await?;
    Ok(ApiResponse::ok(entry))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(entry_id): Path<CartEntryId>,
) -> Result<Json<ApiResponse<CartEntryId>>> {
    CartRepository::new(state.pool())
        .delete(user.id, entry_id)
        .await?;
    Ok(ApiResponse::ok(entry_id))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ApiResponse<CartCleared>>> {
    let removed = CartRepository::new(state.pool())
        .clear_for_user(user.id)
        .await?;
    Ok(ApiResponse::ok(CartCleared { removed }))
}

/// Total quantity, for the header badge.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn count(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ApiResponse<CartCount>>> {
    let count = CartRepository::new(state.pool()).count(user.id).await?;
    Ok(ApiResponse::ok(CartCount { count }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use foilcraft_core::ThermofoilId;

    use super::*;

    #[test]
    fn test_add_defaults_to_one() {
        let body: AddToCart =
            serde_json::from_str(r#"{"item":{"type":"thermofoil","id":3}}"#).unwrap();
        assert_eq!(body.quantity, 1);
        assert_eq!(body.item, ItemRef::Thermofoil(ThermofoilId::new(3)));
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(check_quantity(0).is_err());
        assert!(check_quantity(1).is_ok());
        assert!(check_quantity(MAX_QUANTITY).is_ok());
        assert!(matches!(
            check_quantity(MAX_QUANTITY + 1),
            Err(AppError::BadRequest(_))
        ));
    }
}
