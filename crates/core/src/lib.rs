//! Sneaco Core - Domain types and pure storefront logic.
//!
//! This crate is shared by:
//! - `storefront` - Public-facing storefront server
//! - `cli` - Migrations and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. Everything here is deterministic and
//! can be tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, email, money and statuses
//! - [`catalog`] - Products, variants, size/color resolution and listing filters
//! - [`cart`] - Cart lines with stock clamping
//! - [`checkout`] - Payment-session request building and metadata encoding
//! - [`order`] - Order drafts and payment-session metadata decoding

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod order;
pub mod types;

pub use types::*;
