//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Email/password accounts (Argon2id)
//! - `checkout` - Order creation, hosted payment sessions, reconciliation

pub mod auth;
pub mod checkout;
