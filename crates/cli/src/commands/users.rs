//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! # Promote an existing account to admin
//! fc-cli users set-role -e owner@example.com -r admin
//!
//! # List every account
//! fc-cli users list
//! ```
//!
//! Accounts are created through `POST /api/auth/sign-up`; the CLI only
//! changes roles. The new role applies from the user's next sign-in.

use foilcraft_core::{Email, UserRole};
use foilcraft_storefront::db::{RepositoryError, UserRepository};
use thiserror::Error;

use super::{CommandError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserCommandError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Invalid role.
    #[error("Invalid role: {0}. Valid roles: USER, ADMIN")]
    InvalidRole(String),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account with that email.
    #[error("No user with email: {0}")]
    NotFound(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Parse the command-line arguments before touching the database.
fn parse_args(email: &str, role: &str) -> Result<(Email, UserRole), UserCommandError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserCommandError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| UserCommandError::InvalidEmail(email.to_owned()))?;
    Ok((email, role))
}

/// Change the role of the user with `email`.
///
/// # Errors
///
/// Returns `UserCommandError` if the arguments are invalid, the user does
/// not exist, or the database is unreachable.
pub async fn set_role(email: &str, role: &str) -> Result<(), UserCommandError> {
    let (email, role) = parse_args(email, role)?;
    let pool = connect().await?;

    let user = UserRepository::new(&pool)
        .set_role(&email, role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => UserCommandError::NotFound(email.to_string()),
            other => UserCommandError::Repository(other),
        })?;

    tracing::info!(
        "Role updated! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    tracing::warn!("The new role takes effect the next time the user signs in.");
    Ok(())
}

/// Log every account, newest first.
///
/// # Errors
///
/// Returns `UserCommandError` if the database is unreachable.
pub async fn list() -> Result<(), UserCommandError> {
    let pool = connect().await?;
    let users = UserRepository::new(&pool).list_all().await?;

    tracing::info!("{} users", users.len());
    for user in users {
        tracing::info!("  {} {} <{}> {}", user.id, user.name, user.email, user.role);
    }
    Ok(())
}
