//! Marketplace backend port.
//!
//! The storefront assumes, but does not implement, a REST backend:
//!
//! | Request | Success | Failure |
//! |---|---|---|
//! | `POST /cart/add {productId, quantity}` | 200 | 4xx |
//! | `GET /orders` | `{orders: [...]}` | 5xx |
//! | `POST /orders {cart, shipping, payment}` | `{order}` | 4xx with field errors |
//! | `POST /orders/{id}/cancel` | 200 | 409 on an invalid transition |
//! | `POST /orders/{id}/return {itemRef}` | 200 | 4xx |
//!
//! All requests carry a bearer credential and all bodies are JSON.
//! [`HttpBackend`] is the production implementation; tests substitute their
//! own [`MarketplaceBackend`].

use std::future::Future;

use bazaar_core::{OrderId, ProductId};

use crate::orders::Order;

mod client;
mod error;
pub mod payment;
pub mod types;

pub use client::HttpBackend;
pub use error::BackendError;
pub use payment::{PaymentGateway, PaymentReceipt, SimulatedGateway};
pub use types::CreateOrderRequest;

/// Operations the storefront needs from the backend.
pub trait MarketplaceBackend: Send + Sync {
    /// Sync one cart addition.
    fn add_to_cart(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Every order visible to the current credential.
    fn list_orders(&self) -> impl Future<Output = Result<Vec<Order>, BackendError>> + Send;

    /// Submit an order; the backend's copy is returned.
    fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> impl Future<Output = Result<Order, BackendError>> + Send;

    /// Cancel an order. A 409 means it is no longer cancellable.
    fn cancel_order(
        &self,
        order_id: &OrderId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Ask to return one item of a fulfilled order.
    fn request_return(
        &self,
        order_id: &OrderId,
        item: ProductId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}
