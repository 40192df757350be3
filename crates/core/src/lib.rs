//! Foilcraft Core - Shared types library.
//!
//! This crate provides the domain vocabulary shared by every Foilcraft component:
//! - `storefront` - Public JSON API, checkout orchestration, payment webhooks
//! - `cli` - Migrations, catalog seeding, order maintenance
//! - `integration-tests` - In-memory fixtures for the checkout flow
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. The optional `postgres` feature adds sqlx encoding so
//! the same types can be bound and decoded directly.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, money, item references, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
