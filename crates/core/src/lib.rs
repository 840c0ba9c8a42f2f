//! Bazaar Core - Shared marketplace types.
//!
//! This crate provides the types shared by every Bazaar component:
//! - `storefront` - Cart, pricing, order lifecycle and session engine
//! - `integration-tests` - End-to-end tests against a fake backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! Every status or category that arrives as a string is parsed into a closed
//! enumeration here, so unknown values are rejected at construction.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, money, rates, and status enumerations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
