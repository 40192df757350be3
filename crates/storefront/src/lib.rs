//! Foilcraft Storefront library.
//!
//! The storefront binary is a thin `main` over this crate so the router,
//! checkout service and payment clients can be exercised from tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod routes;
pub mod services;
pub mod state;
