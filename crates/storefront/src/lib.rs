//! Bazaar storefront library.
//!
//! Carts, checkout, orders and the product catalog of the Bazaar store,
//! written against a transactional [`Store`](db::Store) so the same services
//! run on `PostgreSQL` in production and in memory under test.
//!
//! # Architecture
//!
//! - `PostgreSQL` via sqlx, one transaction per write
//! - `moka` caches for product reads, invalidated on every product write
//! - A background worker delivering email through lettre and askama templates
//! - `tracing` for logs, Sentry for error tracking
//!
//! HTTP routing lives outside this crate; [`StorefrontError`](error::StorefrontError)
//! implements axum's `IntoResponse` so any host can return it from handlers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod telemetry;
