//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for common marketplace concepts.

pub mod id;
pub mod price;
pub mod status;

pub use id::*;
pub use price::{CURRENCY_SCALE, CurrencyCode, Price, Rate, RateError, round_currency};
pub use status::*;
