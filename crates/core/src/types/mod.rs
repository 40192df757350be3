//! Core types for Foilcraft.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod item;
pub mod money;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use item::{ItemRef, ItemType};
pub use money::{CurrencyCode, Money, MoneyError};
pub use status::*;
