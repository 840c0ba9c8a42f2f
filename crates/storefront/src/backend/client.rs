//! REST client for the marketplace backend.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use url::Url;

use bazaar_core::{OrderId, ProductId};

use super::MarketplaceBackend;
use super::error::BackendError;
use super::types::{
    AddToCartRequest, CreateOrderRequest, CreateOrderResponse, ErrorBody, OrdersResponse,
    ReturnItemRequest,
};
use crate::config::StorefrontConfig;
use crate::orders::Order;

/// HTTP implementation of [`MarketplaceBackend`].
#[derive(Clone)]
pub struct HttpBackend {
    /// HTTP client with the request timeout applied.
    client: Client,
    /// API root, e.g. `http://localhost:5000/api`.
    base_url: Url,
    /// Bearer credential sent with every request.
    token: Option<SecretString>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpBackend {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token,
            timeout,
        })
    }

    /// Create a client from the storefront configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Request` if the HTTP client cannot be built.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, BackendError> {
        Self::new(
            config.api_url.clone(),
            config.api_token.clone(),
            config.request_timeout,
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses onto `BackendError`.
    async fn send(&self, builder: RequestBuilder) -> Result<Response, BackendError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                BackendError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = body
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

        let err = match status {
            StatusCode::CONFLICT => BackendError::Conflict(message),
            StatusCode::NOT_FOUND => BackendError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized {
                status: status.as_u16(),
            },
            s if s.is_server_error() => BackendError::Unavailable {
                status: status.as_u16(),
            },
            _ => BackendError::Rejected {
                status: status.as_u16(),
                message,
                field_errors: body.errors,
            },
        };

        if err.is_retryable() {
            error!(status = status.as_u16(), error = %err, "Backend request failed");
        } else {
            warn!(status = status.as_u16(), error = %err, "Backend rejected request");
        }
        Err(err)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        response
            .json()
            .await
            .map_err(|e| BackendError::Response(e.to_string()))
    }
}

impl MarketplaceBackend for HttpBackend {
    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> Result<(), BackendError> {
        let body = AddToCartRequest {
            product_id,
            quantity,
        };
        self.send(self.request(Method::POST, "cart/add").json(&body))
            .await?;
        debug!("Cart line synced");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_orders(&self) -> Result<Vec<Order>, BackendError> {
        let response = self.send(self.request(Method::GET, "orders")).await?;
        let body: OrdersResponse = Self::json(response).await?;
        debug!(count = body.orders.len(), "Orders fetched");
        Ok(body.orders)
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, BackendError> {
        let response = self
            .send(self.request(Method::POST, "orders").json(request))
            .await?;
        let body: CreateOrderResponse = Self::json(response).await?;
        debug!(order_id = %body.order.id, "Order accepted by backend");
        Ok(body.order)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), BackendError> {
        self.send(self.request(Method::POST, &format!("orders/{order_id}/cancel")))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %order_id, item = %item))]
    async fn request_return(&self, order_id: &OrderId, item: ProductId) -> Result<(), BackendError> {
        let body = ReturnItemRequest { item_ref: item };
        self.send(
            self.request(Method::POST, &format!("orders/{order_id}/return"))
                .json(&body),
        )
        .await?;
        Ok(())
    }
}
