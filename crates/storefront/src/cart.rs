//! Shopping cart for the active session.
//!
//! The cart holds at most one line per product. Adding a product that is
//! already present increases that line's quantity; lines keep their insertion
//! order for display. Quantities are always at least one: removing a line is an
//! explicit [`CartStore::remove_item`] call, never a zero quantity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use bazaar_core::{CurrencyCode, Price, ProductId, SellerId};

use crate::models::Product;

/// Errors raised by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantity below one, or one that would overflow the line.
    #[error("invalid quantity {quantity}")]
    InvalidQuantity {
        /// Rejected quantity.
        quantity: u32,
    },

    /// Not enough units in stock for the requested quantity.
    #[error("only {available} of product {product_id} in stock (requested {requested})")]
    InsufficientStock {
        /// Product being added.
        product_id: ProductId,
        /// Total quantity the line would hold.
        requested: u32,
        /// Units available.
        available: u32,
    },

    /// No line exists for the product.
    #[error("product {0} is not in the cart")]
    LineNotFound(ProductId),

    /// The product is priced in another currency than the cart.
    #[error("product {product_id} is priced in {found}, cart uses {expected}")]
    CurrencyMismatch {
        /// Product being added.
        product_id: ProductId,
        /// Cart currency.
        expected: &'static str,
        /// Product currency.
        found: &'static str,
    },

    /// The product has a negative unit price.
    #[error("product {product_id} has a negative price ({price})")]
    InvalidPrice {
        /// Rejected product.
        product_id: ProductId,
        /// Offending unit price.
        price: Decimal,
    },

    /// Restored cart data holds two lines for the same product.
    #[error("product {0} appears in more than one cart line")]
    DuplicateLine(ProductId),
}

/// One product-quantity pairing in the cart.
///
/// Carries a copy of the product fields needed for pricing and display, taken
/// when the product was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product reference.
    pub product_id: ProductId,
    /// Product name at the time it was added.
    pub name: String,
    /// Listing seller.
    pub seller_id: SellerId,
    /// Seller display name.
    #[serde(default)]
    pub seller_name: String,
    /// Unit price at the time it was added.
    pub unit_price: Price,
    /// Units in this line, at least one.
    pub quantity: u32,
    /// Stock reported by the catalog when last added.
    pub available_stock: u32,
}

impl CartLine {
    fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            seller_id: product.seller_id,
            seller_name: product.seller_name.clone(),
            unit_price: product.price,
            quantity,
            available_stock: product.stock,
        }
    }

    /// `quantity x unit price`, unrounded.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price.amount * Decimal::from(self.quantity)
    }
}

/// The authoritative set of cart lines for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartStore {
    currency: CurrencyCode,
    lines: Vec<CartLine>,
    #[serde(skip, default = "default_enforce_stock")]
    enforce_stock: bool,
}

const fn default_enforce_stock() -> bool {
    true
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new(CurrencyCode::default())
    }
}

impl CartStore {
    /// Create an empty cart that enforces stock limits.
    #[must_use]
    pub const fn new(currency: CurrencyCode) -> Self {
        Self {
            currency,
            lines: Vec::new(),
            enforce_stock: true,
        }
    }

    /// Turn stock enforcement on or off.
    #[must_use]
    pub const fn with_stock_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_stock = enforce;
        self
    }

    /// Rebuild a cart from persisted lines, checking every line invariant.
    ///
    /// # Errors
    ///
    /// Returns a `CartError` if a line has a zero quantity, a negative or
    /// foreign-currency price, or duplicates another line's product.
    pub fn from_lines(
        currency: CurrencyCode,
        lines: impl IntoIterator<Item = CartLine>,
    ) -> Result<Self, CartError> {
        let mut cart = Self::new(currency);
        for line in lines {
            if line.quantity == 0 {
                return Err(CartError::InvalidQuantity { quantity: 0 });
            }
            check_price(line.product_id, line.unit_price)?;
            cart.check_currency(line.product_id, line.unit_price)?;
            if cart.position(line.product_id).is_some() {
                return Err(CartError::DuplicateLine(line.product_id));
            }
            cart.lines.push(line);
        }
        Ok(cart)
    }

    /// Add `quantity` units of a product.
    ///
    /// Increments the existing line for the product if there is one, otherwise
    /// appends a new line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` if `quantity` is zero or the line would
    /// overflow, `InvalidPrice` for a negative price, `InsufficientStock` if
    /// stock is enforced and the resulting line would exceed it, and
    /// `CurrencyMismatch` if the product is priced in another currency.
    pub fn add_item(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        check_price(product.id, product.price)?;
        self.check_currency(product.id, product.price)?;

        let existing = self
            .position(product.id)
            .and_then(|idx| self.lines.get(idx))
            .map_or(0, |line| line.quantity);
        let requested = existing
            .checked_add(quantity)
            .ok_or(CartError::InvalidQuantity { quantity })?;
        self.check_stock(product.id, requested, product.stock)?;

        if let Some(line) = self.line_mut(product.id) {
            line.quantity = requested;
            line.available_stock = product.stock;
        } else {
            self.lines.push(CartLine::from_product(product, quantity));
        }

        debug!(product_id = %product.id, quantity = requested, "Cart line updated");
        Ok(())
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity` if `quantity` is zero, `LineNotFound` if the
    /// product is not in the cart, and `InsufficientStock` if stock is enforced
    /// and exceeded. The cart is unchanged on error.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let available = self
            .lines
            .iter()
            .find(|line| line.product_id == product_id)
            .map(|line| line.available_stock)
            .ok_or(CartError::LineNotFound(product_id))?;
        self.check_stock(product_id, quantity, available)?;

        if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }

        debug!(product_id = %product_id, quantity, "Cart quantity set");
        Ok(())
    }

    /// Remove a product's line. Does nothing if the product is not in the cart.
    pub fn remove_item(&mut self, product_id: ProductId) {
        let before = self.lines.len();
        self.lines.retain(|line| line.product_id != product_id);
        if self.lines.len() != before {
            debug!(product_id = %product_id, "Cart line removed");
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
        debug!("Cart cleared");
    }

    /// Read-only view of the lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Owned copy of the lines, detached from the cart.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CartLine> {
        self.lines.clone()
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    /// Sum of `quantity x unit price` over every line, at full precision.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        let amount = self.lines.iter().map(CartLine::line_total).sum();
        Price::new(amount, self.currency)
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across every line.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Cart currency.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Whether stock limits are enforced.
    #[must_use]
    pub const fn enforces_stock(&self) -> bool {
        self.enforce_stock
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| line.product_id == product_id)
    }

    fn check_currency(&self, product_id: ProductId, price: Price) -> Result<(), CartError> {
        if price.currency_code == self.currency {
            Ok(())
        } else {
            Err(CartError::CurrencyMismatch {
                product_id,
                expected: self.currency.code(),
                found: price.currency_code.code(),
            })
        }
    }

    const fn check_stock(
        &self,
        product_id: ProductId,
        requested: u32,
        available: u32,
    ) -> Result<(), CartError> {
        if self.enforce_stock && requested > available {
            return Err(CartError::InsufficientStock {
                product_id,
                requested,
                available,
            });
        }
        Ok(())
    }
}

fn check_price(product_id: ProductId, price: Price) -> Result<(), CartError> {
    if price.amount < Decimal::ZERO {
        return Err(CartError::InvalidPrice {
            product_id,
            price: price.amount,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use bazaar_core::Category;

    use super::*;

    pub(crate) fn product(id: i32, price: Decimal, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            price: Price::new(price, CurrencyCode::USD),
            seller_id: SellerId::new(100 + id % 3),
            seller_name: format!("Seller {}", id % 3),
            stock,
            category: Category::Electronics,
        }
    }

    #[test]
    fn test_add_same_product_accumulates() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(10.00), 50);

        cart.add_item(&p, 2).unwrap();
        cart.add_item(&p, 3).unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.lines()[0].quantity, 5);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let mut cart = CartStore::default();
        cart.add_item(&product(3, dec!(1), 10), 1).unwrap();
        cart.add_item(&product(1, dec!(1), 10), 1).unwrap();
        cart.add_item(&product(3, dec!(1), 10), 1).unwrap();

        let ids: Vec<i32> = cart.lines().iter().map(|l| l.product_id.as_i32()).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_add_zero_quantity_fails() {
        let mut cart = CartStore::default();
        let err = cart.add_item(&product(1, dec!(5), 10), 0).unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity { quantity: 0 });
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_beyond_stock_fails() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(5), 4);
        cart.add_item(&p, 3).unwrap();

        let err = cart.add_item(&p, 2).unwrap_err();
        assert_eq!(
            err,
            CartError::InsufficientStock {
                product_id: p.id,
                requested: 5,
                available: 4,
            }
        );
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_stock_not_enforced_when_disabled() {
        let mut cart = CartStore::default().with_stock_enforcement(false);
        cart.add_item(&product(1, dec!(5), 0), 7).unwrap();
        assert_eq!(cart.item_count(), 7);
    }

    #[test]
    fn test_quantity_overflow_is_rejected() {
        let mut cart = CartStore::default().with_stock_enforcement(false);
        let p = product(1, dec!(1), 0);
        cart.add_item(&p, u32::MAX).unwrap();

        let err = cart.add_item(&p, 1).unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity { quantity: 1 });
        assert_eq!(cart.lines()[0].quantity, u32::MAX);
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let mut cart = CartStore::default();
        let err = cart.add_item(&product(1, dec!(-25.00), 5), 2).unwrap_err();

        assert_eq!(
            err,
            CartError::InvalidPrice {
                product_id: ProductId::new(1),
                price: dec!(-25.00),
            }
        );
        assert!(cart.is_empty());
        assert!(cart.subtotal().is_zero());
    }

    #[test]
    fn test_free_product_is_allowed() {
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(0.00), 5), 1).unwrap();
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_from_lines_rejects_negative_price() {
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(4.00), 3), 1).unwrap();
        let mut lines = cart.snapshot();
        lines[0].unit_price = Price::new(dec!(-4.00), CurrencyCode::USD);

        let err = CartStore::from_lines(CurrencyCode::USD, lines).unwrap_err();
        assert!(matches!(err, CartError::InvalidPrice { .. }));
    }

    #[test]
    fn test_add_foreign_currency_fails() {
        let mut cart = CartStore::new(CurrencyCode::EUR);
        let err = cart.add_item(&product(1, dec!(5), 5), 1).unwrap_err();
        assert!(matches!(err, CartError::CurrencyMismatch { .. }));
    }

    #[test]
    fn test_update_quantity_zero_fails_and_leaves_cart_unchanged() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(12.50), 10);
        cart.add_item(&p, 2).unwrap();
        let before = cart.clone();

        let err = cart.update_quantity(p.id, 0).unwrap_err();

        assert_eq!(err, CartError::InvalidQuantity { quantity: 0 });
        assert_eq!(cart, before);
    }

    #[test]
    fn test_update_quantity_missing_line() {
        let mut cart = CartStore::default();
        let err = cart.update_quantity(ProductId::new(9), 1).unwrap_err();
        assert_eq!(err, CartError::LineNotFound(ProductId::new(9)));
    }

    #[test]
    fn test_update_quantity_respects_stock() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(1), 3);
        cart.add_item(&p, 1).unwrap();

        assert!(cart.update_quantity(p.id, 3).is_ok());
        assert!(matches!(
            cart.update_quantity(p.id, 4),
            Err(CartError::InsufficientStock { .. })
        ));
        assert_eq!(cart.lines()[0].quantity, 3);
    }

    #[test]
    fn test_remove_item_is_idempotent() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(1), 3);
        cart.add_item(&p, 1).unwrap();

        cart.remove_item(p.id);
        cart.remove_item(p.id);
        cart.remove_item(ProductId::new(77));

        assert!(cart.is_empty());
    }

    #[test]
    fn test_subtotal_has_no_float_drift() {
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(0.10), 100), 3).unwrap();
        cart.add_item(&product(2, dec!(0.20), 100), 1).unwrap();

        assert_eq!(cart.subtotal().amount, dec!(0.50));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut cart = CartStore::default();
        let p = product(1, dec!(1), 3);
        cart.add_item(&p, 1).unwrap();

        let snapshot = cart.snapshot();
        cart.clear();

        assert_eq!(snapshot.len(), 1);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_from_lines_rejects_duplicates() {
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(1), 3), 1).unwrap();
        let mut lines = cart.snapshot();
        lines.extend(cart.snapshot());

        let err = CartStore::from_lines(CurrencyCode::USD, lines).unwrap_err();
        assert_eq!(err, CartError::DuplicateLine(ProductId::new(1)));
    }

    #[test]
    fn test_serde_round_trip_restores_enforcement_default() {
        let mut cart = CartStore::default().with_stock_enforcement(false);
        cart.add_item(&product(1, dec!(3.33), 3), 2).unwrap();

        let json = serde_json::to_string(&cart).unwrap();
        let restored: CartStore = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.lines(), cart.lines());
        assert!(restored.enforces_stock());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, u32),
        Update(usize, u32),
        Remove(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..5usize, 0..6u32).prop_map(|(p, q)| Op::Add(p, q)),
            (0..5usize, 0..6u32).prop_map(|(p, q)| Op::Update(p, q)),
            (0..5usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_subtotal_matches_lines(
            cents in prop::collection::vec(0i64..100_000, 5),
            ops in prop::collection::vec(op_strategy(), 0..40),
        ) {
            let products: Vec<Product> = cents
                .iter()
                .enumerate()
                .map(|(i, c)| product(i32::try_from(i).unwrap(), Decimal::new(*c, 2), 1_000))
                .collect();
            let mut cart = CartStore::default();

            for op in ops {
                match op {
                    Op::Add(p, q) => { let _ = cart.add_item(&products[p], q); }
                    Op::Update(p, q) => { let _ = cart.update_quantity(products[p].id, q); }
                    Op::Remove(p) => cart.remove_item(products[p].id),
                }

                let expected: Decimal = cart
                    .lines()
                    .iter()
                    .map(|l| l.unit_price.amount * Decimal::from(l.quantity))
                    .sum();
                prop_assert_eq!(cart.subtotal().amount, expected);
                prop_assert!(cart.lines().iter().all(|l| l.quantity >= 1));

                let mut ids: Vec<ProductId> = cart.lines().iter().map(|l| l.product_id).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), cart.len());
            }
        }
    }
}
