//! User account handlers.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::UserRepository;
use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::User;
use crate::routes::ApiResponse;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// The signed-in user's profile, read fresh from the database.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<ApiResponse<User>>> {
    let user = AuthService::new(state.pool()).get_user(user.id).await?;
    Ok(ApiResponse::ok(user))
}

#[instrument(skip(state, _admin))]
pub async fn list_all(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<ApiResponse<Vec<User>>>> {
    let users = UserRepository::new(state.pool()).list_all().await?;
    Ok(ApiResponse::ok(users))
}
