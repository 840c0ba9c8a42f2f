//! Payment authorization port.
//!
//! Card details stay on this side of the port: the gateway receives them,
//! and everything downstream only sees the returned [`PaymentReceipt`].

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use bazaar_core::{OrderId, PaymentMethod, Price};

use super::error::BackendError;
use crate::orders::PaymentDetails;

/// Proof that a payment was authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Gateway authorization reference.
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Price,
    /// Last four card digits, for card payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_last_four: Option<String>,
    pub authorized_at: DateTime<Utc>,
}

/// Authorizes a payment for an order total.
pub trait PaymentGateway: Send + Sync {
    /// Authorize `amount` for `order_id`.
    ///
    /// # Errors
    ///
    /// Returns `PaymentDeclined` when the payment is refused, or a transport
    /// error when the gateway cannot be reached.
    fn authorize(
        &self,
        order_id: &OrderId,
        amount: Price,
        payment: &PaymentDetails,
    ) -> impl Future<Output = Result<PaymentReceipt, BackendError>> + Send;

    /// Release an authorization that will never be captured.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the gateway cannot be reached.
    fn void(&self, receipt: &PaymentReceipt) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Gateway that approves every payment after a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
}

impl SimulatedGateway {
    /// Processing delay of the simulated gateway.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(2);

    /// Create a gateway that answers after `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl PaymentGateway for SimulatedGateway {
    #[instrument(skip(self, payment), fields(order_id = %order_id, method = %payment.method))]
    async fn authorize(
        &self,
        order_id: &OrderId,
        amount: Price,
        payment: &PaymentDetails,
    ) -> Result<PaymentReceipt, BackendError> {
        tokio::time::sleep(self.delay).await;

        let reference = format!("PAY-{}", Uuid::new_v4().simple()).to_uppercase();
        debug!(%reference, %amount, "Payment authorized");

        Ok(PaymentReceipt {
            reference,
            method: payment.method,
            amount,
            card_last_four: payment.card.as_ref().map(crate::orders::CardDetails::last_four),
            authorized_at: Utc::now(),
        })
    }

    #[instrument(skip(self, receipt), fields(reference = %receipt.reference))]
    async fn void(&self, receipt: &PaymentReceipt) -> Result<(), BackendError> {
        tokio::time::sleep(self.delay).await;
        debug!(amount = %receipt.amount, "Authorization voided");
        Ok(())
    }
}
