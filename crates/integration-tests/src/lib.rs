//! Integration test support for the Bazaar storefront.
//!
//! [`FakeMarketplace`] serves the marketplace REST contract from an in-process
//! `axum` server on an ephemeral port, so the real [`HttpBackend`] can be
//! driven end to end. Tests flip failure switches through
//! [`FakeMarketplace::state`] and inspect what the server received.
//!
//! ```bash
//! cargo test -p bazaar-integration-tests
//! ```
//!
//! [`HttpBackend`]: bazaar_storefront::HttpBackend

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{Mutex, MutexGuard};
use url::Url;

use bazaar_core::{Category, CurrencyCode, OrderStatus, Price, ProductId, SellerId, UserId};
use bazaar_storefront::backend::types::{
    AddToCartRequest, CreateOrderRequest, CreateOrderResponse, OrdersResponse, ReturnItemRequest,
};
use bazaar_storefront::orders::{CardDetails, PaymentDetails, ReturnRequest, ShippingInfo};
use bazaar_storefront::{CheckoutForm, Order, Product, StorefrontConfig, User};

/// Bearer credential the fake server accepts.
pub const API_TOKEN: &str = "bz_live_7fQ2mX9pLk4RtW8vNc3J";

/// What the fake server has seen, and how it should misbehave.
#[derive(Debug)]
pub struct FakeState {
    /// Every accepted `POST /cart/add`.
    pub cart_adds: Vec<AddToCartRequest>,
    /// Orders the server holds, in creation order.
    pub orders: Vec<Order>,
    /// Buyer recorded on created orders.
    pub buyer_id: UserId,
    /// Answer `POST /cart/add` with this status instead of 200.
    pub cart_failure: Option<StatusCode>,
    /// Reject `POST /orders` with a field error on `zipCode`.
    pub reject_orders: bool,
    /// Wait this long before answering `POST /cart/add`.
    pub cart_delay: Option<Duration>,
    /// Authorization headers, one per request.
    pub authorizations: Vec<Option<String>>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            cart_adds: Vec::new(),
            orders: Vec::new(),
            buyer_id: UserId::new(1),
            cart_failure: None,
            reject_orders: false,
            cart_delay: None,
            authorizations: Vec::new(),
        }
    }
}

impl FakeState {
    /// Change an order's status behind the storefront's back.
    pub fn set_status(&mut self, order_id: &str, status: OrderStatus) {
        if let Some(order) = self.orders.iter_mut().find(|o| o.id.as_str() == order_id) {
            order.status = status;
        }
    }
}

type Shared = Arc<Mutex<FakeState>>;

/// A running fake of the marketplace API.
#[derive(Debug)]
pub struct FakeMarketplace {
    addr: SocketAddr,
    state: Shared,
}

impl FakeMarketplace {
    /// Bind to an ephemeral local port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/cart/add", post(add_to_cart))
            .route("/api/orders", get(list_orders).post(create_order))
            .route("/api/orders/{id}/cancel", post(cancel_order))
            .route("/api/orders/{id}/return", post(request_return))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                panic!("fake marketplace stopped: {e}");
            }
        });

        Ok(Self { addr, state })
    }

    /// API root, as `BAZAAR_API_URL` expects it.
    ///
    /// # Panics
    ///
    /// Never in practice; the address always forms a valid URL.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn api_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).unwrap()
    }

    /// Lock the server state.
    pub async fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().await
    }

    /// Storefront configuration pointing at this server.
    ///
    /// `overrides` replaces or adds environment variables.
    ///
    /// # Panics
    ///
    /// Panics if an override is not a valid configuration value.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn config(&self, overrides: &[(&str, &str)]) -> StorefrontConfig {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("BAZAAR_API_URL".to_string(), self.api_url().to_string()),
            ("BAZAAR_API_TOKEN".to_string(), API_TOKEN.to_string()),
            ("BAZAAR_REQUEST_TIMEOUT_SECS".to_string(), "5".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }
        StorefrontConfig::from_vars(|key| vars.get(key).cloned()).unwrap()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn authorized(state: &mut FakeState, headers: &HeaderMap) -> Result<(), Response> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let ok = auth.as_deref() == Some(format!("Bearer {API_TOKEN}").as_str());
    state.authorizations.push(auth);
    if ok {
        Ok(())
    } else {
        Err(error(StatusCode::UNAUTHORIZED, "invalid token"))
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn add_to_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddToCartRequest>,
) -> Response {
    let delay = {
        let mut state = state.lock().await;
        if let Err(response) = authorized(&mut state, &headers) {
            return response;
        }
        state.cart_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let mut state = state.lock().await;
    if let Some(status) = state.cart_failure {
        return error(status, "cart service unavailable");
    }
    state.cart_adds.push(body);
    StatusCode::OK.into_response()
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = authorized(&mut state, &headers) {
        return response;
    }
    Json(OrdersResponse {
        orders: state.orders.clone(),
    })
    .into_response()
}

async fn create_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = authorized(&mut state, &headers) {
        return response;
    }
    if state.reject_orders {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Invalid shipping details",
                "errors": [{ "field": "zipCode", "message": "We do not ship to that ZIP code" }]
            })),
        )
            .into_response();
    }
    if request.payment.reference.is_empty() {
        return error(StatusCode::BAD_REQUEST, "missing payment reference");
    }

    let now = Utc::now();
    let order = Order {
        id: request.order_id,
        buyer_id: state.buyer_id,
        lines: request.cart,
        status: OrderStatus::Processing,
        subtotal: request.totals.subtotal,
        shipping_fee: request.totals.shipping_fee,
        tax: request.totals.tax,
        total: request.totals.total,
        commission: request.totals.commission,
        payment_method: request.payment.method,
        shipping: request.shipping,
        created_at: now,
        tracking_number: None,
        estimated_delivery: None,
        shipped_at: None,
        delivered_at: None,
        cancelled_at: None,
        returns: Vec::new(),
    };
    state.orders.push(order.clone());
    Json(CreateOrderResponse { order }).into_response()
}

async fn cancel_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = authorized(&mut state, &headers) {
        return response;
    }
    let Some(order) = state.orders.iter_mut().find(|o| o.id.as_str() == id) else {
        return error(StatusCode::NOT_FOUND, "order not found");
    };
    if order.status != OrderStatus::Processing {
        return error(StatusCode::CONFLICT, "order can no longer be cancelled");
    }
    order.status = OrderStatus::Cancelled;
    order.cancelled_at = Some(Utc::now());
    StatusCode::OK.into_response()
}

async fn request_return(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReturnItemRequest>,
) -> Response {
    let mut state = state.lock().await;
    if let Err(response) = authorized(&mut state, &headers) {
        return response;
    }
    let Some(order) = state.orders.iter_mut().find(|o| o.id.as_str() == id) else {
        return error(StatusCode::NOT_FOUND, "order not found");
    };
    if order.status != OrderStatus::Fulfilled {
        return error(StatusCode::CONFLICT, "only delivered orders can be returned");
    }
    order.returns.push(ReturnRequest {
        product_id: body.item_ref,
        requested_at: Utc::now(),
    });
    StatusCode::OK.into_response()
}

// =============================================================================
// Fixtures
// =============================================================================

/// A product listed by seller `100 + id % 3`.
#[must_use]
pub fn product(id: i32, price: Decimal, stock: u32) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Product {id}"),
        price: Price::new(price, CurrencyCode::USD),
        seller_id: SellerId::new(100 + id % 3),
        seller_name: format!("Seller {}", id % 3),
        stock,
        category: Category::Home,
    }
}

/// The buyer every fake order belongs to by default.
#[must_use]
pub fn buyer() -> User {
    User::buyer(UserId::new(1), "Ada Buyer", "ada@bazaar.test")
}

/// A seller user linked to `seller_id`.
#[must_use]
pub fn seller(seller_id: i32) -> User {
    User::seller(
        UserId::new(2),
        SellerId::new(seller_id),
        "Sam Seller",
        "sam@bazaar.test",
    )
}

/// A complete card checkout.
#[must_use]
pub fn checkout_form() -> CheckoutForm {
    CheckoutForm {
        shipping: ShippingInfo {
            shipping_address: "12 Market Street".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            phone: "555-0100".to_string(),
            ..ShippingInfo::default()
        },
        payment: PaymentDetails::card(CardDetails {
            number: SecretString::from("4242 4242 4242 4242"),
            expiry: "12/29".to_string(),
            cvv: SecretString::from("123"),
            name_on_card: "Ada Buyer".to_string(),
        }),
    }
}
