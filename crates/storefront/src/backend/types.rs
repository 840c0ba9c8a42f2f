//! Request and response bodies for the marketplace REST API.

use serde::{Deserialize, Serialize};

use bazaar_core::{OrderId, PaymentMethod, Price, ProductId};

use crate::orders::{FieldError, Order, OrderLine, ShippingInfo};

/// `POST /cart/add`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// `GET /orders`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

/// Payment part of an order submission. Card details never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub method: PaymentMethod,
    /// Authorization reference from the payment gateway.
    pub reference: String,
}

/// Amounts the client priced the order at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Price,
    pub shipping_fee: Price,
    pub tax: Price,
    pub total: Price,
    pub commission: Price,
}

/// `POST /orders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub order_id: OrderId,
    pub cart: Vec<OrderLine>,
    pub shipping: ShippingInfo,
    pub payment: PaymentSubmission,
    pub totals: OrderTotals,
}

impl CreateOrderRequest {
    /// Submission for a locally drafted order.
    #[must_use]
    pub fn for_draft(order: &Order, payment_reference: String) -> Self {
        Self {
            order_id: order.id.clone(),
            cart: order.lines.clone(),
            shipping: order.shipping.clone(),
            payment: PaymentSubmission {
                method: order.payment_method,
                reference: payment_reference,
            },
            totals: OrderTotals {
                subtotal: order.subtotal,
                shipping_fee: order.shipping_fee,
                tax: order.tax,
                total: order.total,
                commission: order.commission,
            },
        }
    }
}

/// Response to `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order: Order,
}

/// `POST /orders/{id}/return`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItemRequest {
    pub item_ref: ProductId,
}

/// Error body the backend sends with 4xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}
