//! Catalog product as seen by the cart.

use serde::{Deserialize, Serialize};

use bazaar_core::{Category, Price, ProductId, SellerId};

/// A product listing.
///
/// Read-only to the cart and order engine. Carts and orders copy the fields
/// they need, so later catalog edits never reach placed orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Unit price (non-negative).
    pub price: Price,
    /// Listing seller.
    pub seller_id: SellerId,
    /// Seller display name.
    #[serde(default)]
    pub seller_name: String,
    /// Units available for sale.
    pub stock: u32,
    /// Catalog category.
    #[serde(default)]
    pub category: Category,
}

impl Product {
    /// Whether no units are left.
    #[must_use]
    pub const fn is_out_of_stock(&self) -> bool {
        self.stock == 0
    }
}
