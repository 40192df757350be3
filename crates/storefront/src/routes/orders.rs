//! Order history handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::OrderRepository;
use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{Order, OrderWithCustomer};
use crate::routes::ApiResponse;
use crate::state::AppState;

/// The signed-in user's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_mine(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ApiResponse<Vec<Order>>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(ApiResponse::ok(orders))
}

/// Every order with the buyer's name and email.
#[instrument(skip(state, _admin))]
pub async fn list_all(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<ApiResponse<Vec<OrderWithCustomer>>>> {
    let orders = OrderRepository::new(state.pool())
        .list_all_with_customer()
        .await?;
    Ok(ApiResponse::ok(orders))
}
