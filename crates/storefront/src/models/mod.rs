//! Domain models for the storefront.
//!
//! Row types that mirror the database live next to their repositories in
//! `crate::db`; the types here are the validated shapes handlers and services
//! pass around and serialize.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;
pub mod user;

pub use cart::{CartEntry, CartLine};
pub use catalog::{CatalogItem, NewProduct, NewThermofoil, Product, ThermofoilProduct};
pub use order::{NewOrder, Order, OrderLine, OrderWithCustomer, SessionGuard};
pub use session::CurrentUser;
pub use user::User;
