//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Orders are the
//! exception: their identifier is a generated `ORD-` reference, see [`OrderId`].

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a type-safe numeric ID wrapper.
///
/// Creates a newtype wrapper around `i32` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_i32()`
/// - `From<i32>` and `Into<i32>` implementations
///
/// # Example
///
/// ```rust
/// # use bazaar_core::define_id;
/// define_id!(ShopperId);
/// define_id!(ListingId);
///
/// let shopper = ShopperId::new(1);
/// let listing = ListingId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: ShopperId = listing;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            /// Create a new ID from an i32 value.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// Get the underlying i32 value.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);
define_id!(SellerId);

/// Errors that can occur when parsing an [`OrderId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderIdError {
    /// The reference does not start with `ORD-`.
    #[error("order id must start with {prefix}")]
    MissingPrefix {
        /// Expected prefix.
        prefix: &'static str,
    },
    /// Nothing follows the prefix.
    #[error("order id has an empty suffix")]
    EmptySuffix,
    /// The suffix contains something other than ASCII letters and digits.
    #[error("order id suffix must be alphanumeric")]
    InvalidCharacter,
}

/// Order reference such as `ORD-K3J9X0QZ2`.
///
/// Generated once when an order is created; never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    /// Prefix carried by every order reference.
    pub const PREFIX: &'static str = "ORD-";

    /// Number of characters in a generated suffix.
    pub const SUFFIX_LEN: usize = 9;

    const ALPHABET: &'static [u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    /// Generate a fresh order reference from random v4 UUID bits.
    #[must_use]
    pub fn generate() -> Self {
        let mut bits = Uuid::new_v4().as_u128();
        let mut id = String::with_capacity(Self::PREFIX.len() + Self::SUFFIX_LEN);
        id.push_str(Self::PREFIX);
        for _ in 0..Self::SUFFIX_LEN {
            let digit = usize::try_from(bits % 36).unwrap_or_default();
            id.push(Self::ALPHABET.get(digit).copied().map_or('0', char::from));
            bits /= 36;
        }
        Self(id)
    }

    /// Parse an existing order reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is missing or the suffix is empty or
    /// not alphanumeric.
    pub fn parse(s: &str) -> Result<Self, OrderIdError> {
        let suffix = s.strip_prefix(Self::PREFIX).ok_or(OrderIdError::MissingPrefix {
            prefix: Self::PREFIX,
        })?;

        if suffix.is_empty() {
            return Err(OrderIdError::EmptySuffix);
        }

        if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OrderIdError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OrderId {
    type Err = OrderIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderId {
    type Error = OrderIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderId> for String {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_numeric_ids_round_trip_through_i32() {
        let id = ProductId::new(42);
        assert_eq!(id.as_i32(), 42);
        assert_eq!(i32::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_generated_order_id_shape() {
        let id = OrderId::generate();
        let suffix = id.as_str().strip_prefix(OrderId::PREFIX).unwrap();
        assert_eq!(suffix.len(), OrderId::SUFFIX_LEN);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_generated_order_ids_are_distinct() {
        let ids: HashSet<OrderId> = (0..500).map(|_| OrderId::generate()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_order_id_parse_errors() {
        assert_eq!(
            OrderId::parse("123"),
            Err(OrderIdError::MissingPrefix { prefix: "ORD-" })
        );
        assert_eq!(OrderId::parse("ORD-"), Err(OrderIdError::EmptySuffix));
        assert_eq!(
            OrderId::parse("ORD-12 3"),
            Err(OrderIdError::InvalidCharacter)
        );
        assert!(OrderId::parse("ORD-001").is_ok());
    }

    #[test]
    fn test_order_id_serde_rejects_malformed() {
        let id: OrderId = serde_json::from_str("\"ORD-ABC123\"").unwrap();
        assert_eq!(id.as_str(), "ORD-ABC123");
        assert!(serde_json::from_str::<OrderId>("\"order-1\"").is_err());
    }
}
