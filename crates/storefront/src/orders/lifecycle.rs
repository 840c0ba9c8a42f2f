//! Order state machine.
//!
//! ```text
//! Processing --ship--> Shipped --deliver--> Fulfilled
//!     |
//!     +--cancel--> Cancelled
//! ```
//!
//! `Fulfilled` and `Cancelled` are terminal. A return request is accepted only
//! on a fulfilled order and leaves its status unchanged. Each transition is
//! computed on a copy and swapped in whole, so a rejected transition leaves the
//! stored order untouched.

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use bazaar_core::{CurrencyCode, OrderId, OrderStatus, PaymentMethod, Price, ProductId, SellerId, UserId};

use super::checkout::{CheckoutForm, Field, ShippingInfo, ValidationErrors};
use crate::cart::{CartLine, CartStore};
use crate::pricing::{self, FeeSchedule};

/// Days between placing an order and its estimated delivery.
pub const ESTIMATED_DELIVERY_DAYS: u64 = 5;

/// Something that can be done to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Ship,
    Deliver,
    Cancel,
    RequestReturn,
}

impl OrderAction {
    /// Every action.
    pub const ALL: [Self; 4] = [Self::Ship, Self::Deliver, Self::Cancel, Self::RequestReturn];

    /// Status after applying this action to `from`, or `None` if not allowed.
    #[must_use]
    pub const fn target(self, from: OrderStatus) -> Option<OrderStatus> {
        match (from, self) {
            (OrderStatus::Processing, Self::Ship) => Some(OrderStatus::Shipped),
            (OrderStatus::Shipped, Self::Deliver) => Some(OrderStatus::Fulfilled),
            (OrderStatus::Processing, Self::Cancel) => Some(OrderStatus::Cancelled),
            (OrderStatus::Fulfilled, Self::RequestReturn) => Some(OrderStatus::Fulfilled),
            _ => None,
        }
    }

    const fn verb(self) -> &'static str {
        match self {
            Self::Ship => "ship",
            Self::Deliver => "deliver",
            Self::Cancel => "cancel",
            Self::RequestReturn => "return items from",
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Rejected transition, naming the current state and the attempted action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} order {order_id} while it is {from}")]
pub struct TransitionError {
    /// Order the action targeted.
    pub order_id: OrderId,
    /// Status at the time of the attempt.
    pub from: OrderStatus,
    /// Attempted action.
    pub action: OrderAction,
}

/// Errors raised by the order book.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// No order with this id.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The action is not allowed from the order's current status.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The returned item is not part of the order.
    #[error("product {product_id} is not part of order {order_id}")]
    UnknownItem {
        /// Order the return targeted.
        order_id: OrderId,
        /// Item that was not found.
        product_id: ProductId,
    },
}

/// One purchased product, copied from the cart at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: ProductId,
    pub name: String,
    pub seller_id: SellerId,
    #[serde(default)]
    pub seller_name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl OrderLine {
    /// `quantity x unit price`, unrounded.
    #[must_use]
    pub fn line_total(&self) -> rust_decimal::Decimal {
        self.unit_price.amount * rust_decimal::Decimal::from(self.quantity)
    }
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            name: line.name.clone(),
            seller_id: line.seller_id,
            seller_name: line.seller_name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
        }
    }
}

/// An accepted return request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    /// Returned product.
    pub product_id: ProductId,
    /// When the buyer asked.
    pub requested_at: DateTime<Utc>,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    pub subtotal: Price,
    pub shipping_fee: Price,
    pub tax: Price,
    pub total: Price,
    pub commission: Price,
    pub payment_method: PaymentMethod,
    pub shipping: ShippingInfo,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<ReturnRequest>,
}

impl Order {
    /// Build a `Processing` order from cart lines.
    ///
    /// Prices are copied by value and rounded half-up for persistence.
    ///
    /// # Errors
    ///
    /// Returns every failed field: an empty cart plus any shipping or payment
    /// problems.
    pub fn draft(
        lines: &[CartLine],
        currency: CurrencyCode,
        form: &CheckoutForm,
        schedule: &FeeSchedule,
        buyer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if lines.is_empty() {
            errors.push(Field::Cart, "Your cart is empty");
        }
        if let Err(e) = form.validate() {
            errors.extend(e);
        }
        errors.into_result()?;

        let breakdown = pricing::calculate(lines, currency, schedule).rounded();

        Ok(Self {
            id: OrderId::generate(),
            buyer_id,
            lines: lines.iter().map(OrderLine::from).collect(),
            status: OrderStatus::Processing,
            subtotal: breakdown.subtotal,
            shipping_fee: breakdown.shipping,
            tax: breakdown.tax,
            total: breakdown.total,
            commission: breakdown.commission,
            payment_method: form.payment.method,
            shipping: form.shipping.clone(),
            created_at: now,
            tracking_number: None,
            estimated_delivery: now
                .date_naive()
                .checked_add_days(Days::new(ESTIMATED_DELIVERY_DAYS)),
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            returns: Vec::new(),
        })
    }

    /// Check that `action` is allowed from the current status.
    ///
    /// # Errors
    ///
    /// Returns a `TransitionError` naming the current status and action.
    pub fn check(&self, action: OrderAction) -> Result<OrderStatus, TransitionError> {
        action.target(self.status).ok_or_else(|| TransitionError {
            order_id: self.id.clone(),
            from: self.status,
            action,
        })
    }

    /// Whether any line is sold by `seller_id`.
    #[must_use]
    pub fn involves_seller(&self, seller_id: SellerId) -> bool {
        self.lines.iter().any(|line| line.seller_id == seller_id)
    }

    /// Total units ordered.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    fn shipped(&self, tracking_number: String, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let status = self.check(OrderAction::Ship)?;
        Ok(Self {
            status,
            tracking_number: Some(tracking_number),
            shipped_at: Some(now),
            ..self.clone()
        })
    }

    fn delivered(&self, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let status = self.check(OrderAction::Deliver)?;
        Ok(Self {
            status,
            delivered_at: Some(now),
            ..self.clone()
        })
    }

    fn cancelled(&self, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let status = self.check(OrderAction::Cancel)?;
        Ok(Self {
            status,
            cancelled_at: Some(now),
            ..self.clone()
        })
    }

    fn with_return(&self, product_id: ProductId, now: DateTime<Utc>) -> Result<Self, OrderError> {
        self.check(OrderAction::RequestReturn)?;
        if !self.lines.iter().any(|line| line.product_id == product_id) {
            return Err(OrderError::UnknownItem {
                order_id: self.id.clone(),
                product_id,
            });
        }
        let mut updated = self.clone();
        updated.returns.push(ReturnRequest {
            product_id,
            requested_at: now,
        });
        Ok(updated)
    }
}

/// The session's orders, in placement order.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Vec<Order>,
}

impl OrderBook {
    /// An empty book.
    #[must_use]
    pub const fn new() -> Self {
        Self { orders: Vec::new() }
    }

    /// Place an order from the cart and clear the cart.
    ///
    /// On failure nothing changes: no order is stored and the cart keeps its
    /// lines.
    ///
    /// # Errors
    ///
    /// Returns every failed field, including an empty cart.
    pub fn create(
        &mut self,
        cart: &mut CartStore,
        form: &CheckoutForm,
        schedule: &FeeSchedule,
        buyer_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Order, ValidationErrors> {
        let order = Order::draft(cart.lines(), cart.currency(), form, schedule, buyer_id, now)?;
        cart.clear();
        self.commit(order.clone());
        Ok(order)
    }

    /// Store an order, replacing any existing order with the same id.
    pub fn commit(&mut self, order: Order) {
        debug!(order_id = %order.id, status = %order.status, "Order committed");
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) => *slot = order,
            None => self.orders.push(order),
        }
    }

    /// Replace every order, e.g. after fetching the list from the backend.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        self.orders = orders;
    }

    /// Mark a processing order as shipped.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Validation` for a blank tracking number, or
    /// `InvalidTransition` unless the order is `Processing`.
    pub fn mark_shipped(
        &mut self,
        order_id: &OrderId,
        tracking_number: &str,
        now: DateTime<Utc>,
    ) -> Result<&Order, OrderError> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(ValidationErrors::single(
                Field::TrackingNumber,
                "Tracking number is required",
            )
            .into());
        }
        let tracking_number = tracking_number.to_string();
        self.transition(order_id, OrderAction::Ship, |o| o.shipped(tracking_number, now))
    }

    /// Mark a shipped order as delivered.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidTransition` unless the order is `Shipped`.
    pub fn mark_delivered(&mut self, order_id: &OrderId, now: DateTime<Utc>) -> Result<&Order, OrderError> {
        self.transition(order_id, OrderAction::Deliver, |o| o.delivered(now))
    }

    /// Cancel an order that has not shipped.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, or `InvalidTransition` unless the order is
    /// `Processing`.
    pub fn cancel(&mut self, order_id: &OrderId, now: DateTime<Utc>) -> Result<&Order, OrderError> {
        self.transition(order_id, OrderAction::Cancel, |o| o.cancelled(now))
    }

    /// Record a return request for one item of a fulfilled order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `InvalidTransition` unless the order is fulfilled,
    /// or `UnknownItem` if the product is not in the order.
    pub fn request_return(
        &mut self,
        order_id: &OrderId,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<&Order, OrderError> {
        self.transition(order_id, OrderAction::RequestReturn, |o| {
            o.with_return(product_id, now)
        })
    }

    /// Check whether `action` is currently allowed on an order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `InvalidTransition`.
    pub fn check(&self, order_id: &OrderId, action: OrderAction) -> Result<&Order, OrderError> {
        let order = self.get(order_id).ok_or_else(|| OrderError::NotFound(order_id.clone()))?;
        order.check(action)?;
        Ok(order)
    }

    /// Look up an order.
    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| &o.id == order_id)
    }

    /// Every order, oldest first.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Orders currently in `status`.
    pub fn with_status(&self, status: OrderStatus) -> impl Iterator<Item = &Order> {
        self.orders.iter().filter(move |o| o.status == status)
    }

    /// Number of orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Whether the book has no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn transition(
        &mut self,
        order_id: &OrderId,
        action: OrderAction,
        apply: impl FnOnce(&Order) -> Result<Order, OrderError>,
    ) -> Result<&Order, OrderError> {
        let slot = self
            .orders
            .iter_mut()
            .find(|o| &o.id == order_id)
            .ok_or_else(|| OrderError::NotFound(order_id.clone()))?;

        let updated = apply(slot).inspect_err(|e| {
            warn!(order_id = %order_id, %action, error = %e, "Order transition rejected");
        })?;

        debug!(order_id = %order_id, from = %slot.status, to = %updated.status, %action, "Order transition");
        *slot = updated;
        Ok(&*slot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::cart::tests::product;
    use crate::orders::checkout::tests::form;

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn placed(book: &mut OrderBook) -> OrderId {
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(40.00), 10), 3).unwrap();
        book.create(&mut cart, &form(), &FeeSchedule::default(), UserId::new(7), now())
            .unwrap()
            .id
            .clone()
    }

    /// Drive a fresh order into `status` through legal transitions.
    fn order_in(book: &mut OrderBook, status: OrderStatus) -> OrderId {
        let id = placed(book);
        match status {
            OrderStatus::Processing => {}
            OrderStatus::Shipped => {
                book.mark_shipped(&id, "TRK1", now()).unwrap();
            }
            OrderStatus::Fulfilled => {
                book.mark_shipped(&id, "TRK1", now()).unwrap();
                book.mark_delivered(&id, now()).unwrap();
            }
            OrderStatus::Cancelled => {
                book.cancel(&id, now()).unwrap();
            }
        }
        id
    }

    fn apply(book: &mut OrderBook, id: &OrderId, action: OrderAction) -> Result<OrderStatus, OrderError> {
        match action {
            OrderAction::Ship => book.mark_shipped(id, "TRK2", now()),
            OrderAction::Deliver => book.mark_delivered(id, now()),
            OrderAction::Cancel => book.cancel(id, now()),
            OrderAction::RequestReturn => book.request_return(id, ProductId::new(1), now()),
        }
        .map(|o| o.status)
    }

    #[test]
    fn test_create_materializes_processing_order_and_clears_cart() {
        let mut book = OrderBook::new();
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(40.00), 10), 3).unwrap();
        let snapshot = cart.snapshot();

        let order = book
            .create(&mut cart, &form(), &FeeSchedule::default(), UserId::new(7), now())
            .unwrap();

        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.total.amount, dec!(129.60));
        assert_eq!(order.commission.amount, dec!(6.00));
        assert_eq!(order.estimated_delivery, NaiveDate::from_ymd_opt(2024, 1, 20));
        let expected: Vec<OrderLine> = snapshot.iter().map(OrderLine::from).collect();
        assert_eq!(order.lines, expected);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_create_with_empty_cart_fails() {
        let mut book = OrderBook::new();
        let mut cart = CartStore::default();

        let errors = book
            .create(&mut cart, &form(), &FeeSchedule::default(), UserId::new(7), now())
            .unwrap_err();

        assert!(errors.has(Field::Cart));
        assert!(book.is_empty());
    }

    #[test]
    fn test_create_failure_reports_all_fields_and_keeps_cart() {
        let mut book = OrderBook::new();
        let mut cart = CartStore::default();
        cart.add_item(&product(1, dec!(1), 10), 1).unwrap();
        let mut bad = form();
        bad.shipping.phone.clear();
        bad.shipping.city.clear();

        let errors = book
            .create(&mut cart, &bad, &FeeSchedule::default(), UserId::new(7), now())
            .unwrap_err();

        assert!(errors.has(Field::Phone));
        assert!(errors.has(Field::City));
        assert_eq!(cart.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn test_order_lines_are_copied_by_value() {
        let mut book = OrderBook::new();
        let mut cart = CartStore::default();
        let mut p = product(1, dec!(10.00), 10);
        cart.add_item(&p, 1).unwrap();
        let id = book
            .create(&mut cart, &form(), &FeeSchedule::default(), UserId::new(7), now())
            .unwrap()
            .id
            .clone();

        p.price.amount = dec!(99.00);

        assert_eq!(book.get(&id).unwrap().lines[0].unit_price.amount, dec!(10.00));
    }

    #[test]
    fn test_ship_then_cancel_is_rejected() {
        let mut book = OrderBook::new();
        let id = placed(&mut book);
        book.mark_shipped(&id, "TRK-77", now()).unwrap();

        let err = book.cancel(&id, now()).unwrap_err();

        assert_eq!(
            err,
            OrderError::InvalidTransition(TransitionError {
                order_id: id.clone(),
                from: OrderStatus::Shipped,
                action: OrderAction::Cancel,
            })
        );
        assert_eq!(book.get(&id).unwrap().status, OrderStatus::Shipped);
    }

    #[test]
    fn test_ship_records_tracking_and_rejects_blank() {
        let mut book = OrderBook::new();
        let id = placed(&mut book);

        assert!(matches!(
            book.mark_shipped(&id, "  ", now()),
            Err(OrderError::Validation(_))
        ));
        let order = book.mark_shipped(&id, " TRK-1 ", now()).unwrap();
        assert_eq!(order.tracking_number.as_deref(), Some("TRK-1"));
        assert_eq!(order.shipped_at, Some(now()));
    }

    #[test]
    fn test_rejected_transition_changes_nothing() {
        let mut book = OrderBook::new();
        let id = placed(&mut book);
        let before = book.get(&id).unwrap().clone();

        assert!(book.mark_delivered(&id, now()).is_err());
        assert_eq!(book.get(&id).unwrap(), &before);
    }

    #[test]
    fn test_return_requires_known_item() {
        let mut book = OrderBook::new();
        let id = order_in(&mut book, OrderStatus::Fulfilled);

        let err = book.request_return(&id, ProductId::new(99), now()).unwrap_err();
        assert!(matches!(err, OrderError::UnknownItem { .. }));

        let order = book.request_return(&id, ProductId::new(1), now()).unwrap();
        assert_eq!(order.status, OrderStatus::Fulfilled);
        assert_eq!(order.returns.len(), 1);
    }

    #[test]
    fn test_unknown_order() {
        let mut book = OrderBook::new();
        let id = OrderId::parse("ORD-MISSING").unwrap();
        assert_eq!(book.cancel(&id, now()).unwrap_err(), OrderError::NotFound(id));
    }

    #[test]
    fn test_exhaustive_transition_table() {
        let allowed = [
            (OrderStatus::Processing, OrderAction::Ship, OrderStatus::Shipped),
            (OrderStatus::Processing, OrderAction::Cancel, OrderStatus::Cancelled),
            (OrderStatus::Shipped, OrderAction::Deliver, OrderStatus::Fulfilled),
            (OrderStatus::Fulfilled, OrderAction::RequestReturn, OrderStatus::Fulfilled),
        ];

        for from in OrderStatus::ALL {
            for action in OrderAction::ALL {
                let mut book = OrderBook::new();
                let id = order_in(&mut book, from);
                let expected = allowed
                    .iter()
                    .find(|(f, a, _)| *f == from && *a == action)
                    .map(|(_, _, to)| *to);

                match (apply(&mut book, &id, action), expected) {
                    (Ok(to), Some(want)) => assert_eq!(to, want, "{from:?} + {action:?}"),
                    (Err(OrderError::InvalidTransition(e)), None) => {
                        assert_eq!(e.from, from);
                        assert_eq!(e.action, action);
                        assert_eq!(book.get(&id).unwrap().status, from);
                    }
                    (got, want) => panic!("{from:?} + {action:?}: got {got:?}, expected {want:?}"),
                }
            }
        }
    }

    #[test]
    fn test_cancel_only_from_processing() {
        for from in OrderStatus::ALL {
            assert_eq!(
                OrderAction::Cancel.target(from).is_some(),
                from == OrderStatus::Processing
            );
        }
    }

    #[test]
    fn test_order_serde_uses_canonical_status() {
        let mut book = OrderBook::new();
        let id = order_in(&mut book, OrderStatus::Fulfilled);
        let json = serde_json::to_value(book.get(&id).unwrap()).unwrap();
        assert_eq!(json["status"], "delivered");

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, OrderStatus::Fulfilled);
    }
}
