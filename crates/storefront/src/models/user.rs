//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use foilcraft_core::{Email, UserId, UserRole};

/// A storefront account. The password hash never leaves the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
