//! Bazaar Core - Shared types library.
//!
//! This crate provides the types used across all Bazaar components:
//! - `storefront` - Carts, checkout, orders, catalog and notifications
//! - `cli` - Command-line tools for migrations and store administration
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and statuses
//! - [`policy`] - The single permission decision point for every role

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod policy;
pub mod types;

pub use policy::{Action, Decision, Resource, authorize};
pub use types::*;
