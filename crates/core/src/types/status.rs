//! Closed enumerations for statuses, roles, and categories.
//!
//! Every value that the backend sends as a free-form string is parsed into one
//! of these enums. Unknown strings are rejected instead of falling through to a
//! default rendering.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a known variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    /// Which enumeration was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Order lifecycle status.
///
/// `Processing -> Shipped -> Fulfilled`, with `Cancelled` reachable only from
/// `Processing`. `Fulfilled` and `Cancelled` are terminal.
///
/// The wire strings `pending` (read as `Processing`) and `completed` (read as
/// `Fulfilled`) are accepted for compatibility; `Fulfilled` is written as
/// `delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, awaiting shipment.
    #[default]
    #[serde(alias = "pending")]
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Delivered to the buyer.
    #[serde(rename = "delivered", alias = "completed")]
    Fulfilled,
    /// Cancelled before shipment.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Processing,
        Self::Shipped,
        Self::Fulfilled,
        Self::Cancelled,
    ];

    /// Whether no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }

    /// Whether the order is still moving towards the buyer.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Processing | Self::Shipped)
    }

    /// Canonical wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Fulfilled => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" | "pending" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" | "completed" => Ok(Self::Fulfilled),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError::new("order status", s)),
        }
    }
}

/// Marketplace user role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Browses products, buys, and tracks orders.
    Buyer,
    /// Lists products and fulfils orders.
    Seller,
    /// Operates the platform.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buyer => write!(f, "buyer"),
            Self::Seller => write!(f, "seller"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Supported checkout payment methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Credit or debit card entered at checkout.
    #[default]
    Card,
    /// Redirect to the Paystack gateway.
    Paystack,
    /// Redirect to the Flutterwave gateway.
    Flutterwave,
}

impl PaymentMethod {
    /// Whether card number, expiry, CVV and cardholder name are required.
    #[must_use]
    pub const fn requires_card_details(&self) -> bool {
        matches!(self, Self::Card)
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Card => "Credit/Debit Card",
            Self::Paystack => "Paystack",
            Self::Flutterwave => "Flutterwave",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card => write!(f, "card"),
            Self::Paystack => write!(f, "paystack"),
            Self::Flutterwave => write!(f, "flutterwave"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(Self::Card),
            "paystack" => Ok(Self::Paystack),
            "flutterwave" => Ok(Self::Flutterwave),
            _ => Err(ParseEnumError::new("payment method", s)),
        }
    }
}

/// Product catalog category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electronics,
    Fashion,
    Home,
    Sports,
    Beauty,
    Books,
    #[default]
    Other,
}

impl Category {
    /// Every category, in catalog order.
    pub const ALL: [Self; 7] = [
        Self::Electronics,
        Self::Fashion,
        Self::Home,
        Self::Sports,
        Self::Beauty,
        Self::Books,
        Self::Other,
    ];

    /// Wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Fashion => "fashion",
            Self::Home => "home",
            Self::Sports => "sports",
            Self::Beauty => "beauty",
            Self::Books => "books",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("category", s))
    }
}

/// Source of platform revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningKind {
    /// Percentage deducted from seller proceeds.
    Commission,
    /// Featured product placement.
    Ads,
    /// One-off seller verification fee.
    Verification,
    /// Per-order service fee.
    ServiceFee,
}

impl fmt::Display for EarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commission => write!(f, "Commission"),
            Self::Ads => write!(f, "Ads"),
            Self::Verification => write!(f, "Verification"),
            Self::ServiceFee => write!(f, "Service Fee"),
        }
    }
}
