//! Authentication route handlers.
//!
//! Sign-in stores a [`CurrentUser`] in the session; every other guarded
//! handler reads it back through the auth extractors.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::ApiResponse;
use crate::services::auth::{AuthError, AuthService, SignUp};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile_image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Create a `USER` account. Does not sign in.
#[instrument(skip(state, request), fields(email = %request.email))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<ApiResponse<User>>)> {
    let user = AuthService::new(state.pool())
        .sign_up(&SignUp {
            name: &request.name,
            email: &request.email,
            password: &request.password,
            profile_image: request.profile_image.as_deref(),
        })
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::ok(user)))
}

/// Verify credentials and start a session.
#[instrument(skip(state, session, request), fields(email = %request.email))]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<SignInRequest>,
) -> Result<Json<ApiResponse<User>>> {
    let user = match AuthService::new(state.pool())
        .sign_in(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(e @ AuthError::InvalidCredentials) => {
            warn!("Sign-in rejected");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    set_current_user(&session, &CurrentUser::from(&user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Signed in", None);
    info!(user_id = %user.id, "User signed in");

    Ok(ApiResponse::ok(user))
}

/// End the session.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Json<ApiResponse<Value>>> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(ApiResponse::ok(json!({ "message": "Signed out" })))
}
