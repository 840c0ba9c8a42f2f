//! The storefront facade.
//!
//! [`Marketplace`] owns the cart and the order book and threads the caller's
//! [`AuthSession`] through every operation explicitly. Operations take
//! `&mut self`, so two mutations never interleave.
//!
//! Backend-synced operations are two-phase: the change is validated (and for
//! the cart, applied) locally first, then sent to the backend. A backend
//! failure rolls the local change back; a `409` on an order transition is
//! reported as `InvalidTransition` and the order is left as it was.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use bazaar_core::{OrderId, OrderStatus, ProductId, Role, SellerId, UserId};

use super::earnings::{
    BuyerOrderStats, PayoutLedger, PayoutRequest, PlatformEarnings, PlatformFee, SellerEarnings,
};
use crate::backend::{BackendError, CreateOrderRequest, MarketplaceBackend, PaymentGateway, PaymentReceipt};
use crate::cart::CartStore;
use crate::config::StorefrontConfig;
use crate::error::{self, Result, StorefrontError};
use crate::models::{Product, User};
use crate::orders::{CheckoutForm, Order, OrderAction, OrderBook, TransitionError};
use crate::pricing::{self, FeeSchedule, PriceBreakdown};
use crate::session::{AccessDenied, AuthSession, SessionStore};

const ANY_ROLE: &[Role] = &[Role::Buyer, Role::Seller, Role::Admin];

/// Cart, checkout, and order operations for one session.
#[derive(Debug)]
pub struct Marketplace<B, P> {
    backend: B,
    gateway: P,
    cart: CartStore,
    book: OrderBook,
    fees: FeeSchedule,
    timeout: Duration,
    /// User whose cart and orders are loaded.
    owner: Option<UserId>,
    payouts: PayoutLedger,
}

impl<B: MarketplaceBackend, P: PaymentGateway> Marketplace<B, P> {
    /// Create a marketplace with an empty cart and order book.
    #[must_use]
    pub fn new(backend: B, gateway: P, config: &StorefrontConfig) -> Self {
        Self {
            backend,
            gateway,
            cart: CartStore::default().with_stock_enforcement(config.enforce_stock),
            book: OrderBook::new(),
            fees: config.fees,
            timeout: config.request_timeout,
            owner: None,
            payouts: PayoutLedger::new(),
        }
    }

    /// The current cart.
    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// Orders known to this session.
    #[must_use]
    pub const fn order_book(&self) -> &OrderBook {
        &self.book
    }

    /// Fee schedule used for pricing.
    #[must_use]
    pub const fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// The backend this marketplace talks to.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub const fn gateway(&self) -> &P {
        &self.gateway
    }

    /// Price breakdown of the current cart, rounded for display.
    #[must_use]
    pub fn price_breakdown(&self) -> PriceBreakdown {
        pricing::calculate(self.cart.lines(), self.cart.currency(), &self.fees).rounded()
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Sign in and restore any cart saved for the session.
    ///
    /// Signing in as someone other than the previous user starts from an
    /// empty cart and order list.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the session cannot be persisted or read.
    pub fn login<S: SessionStore>(&mut self, session: &mut AuthSession<S>, user: User) -> Result<()> {
        let previous = self.owner.or_else(|| session.current_user().map(|u| u.id));
        if previous.is_some_and(|id| id != user.id) {
            debug!(user_id = %user.id, "Different user signed in, dropping cart and orders");
            self.cart.clear();
            self.book.replace_all(Vec::new());
        }
        error::set_sentry_user(&user.id, Some(user.email.as_str()));
        self.owner = Some(user.id);
        session.login(user)?;
        self.restore_cart(session)
    }

    /// Sign out, dropping the cart and the order list.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the session cannot be cleared.
    pub fn logout<S: SessionStore>(&mut self, session: &mut AuthSession<S>) -> Result<()> {
        session.logout()?;
        self.cart.clear();
        self.book.replace_all(Vec::new());
        self.owner = None;
        error::clear_sentry_user();
        Ok(())
    }

    /// Replace the in-memory cart with the one saved in the session.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the session cannot be read.
    pub fn restore_cart<S: SessionStore>(&mut self, session: &mut AuthSession<S>) -> Result<()> {
        if let Some(saved) = session.load_cart()? {
            debug!(lines = saved.len(), "Cart restored from session");
            self.cart = saved.with_stock_enforcement(self.cart.enforces_stock());
        }
        Ok(())
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add a product to the cart and sync the addition to the backend.
    ///
    /// The cart is changed first; if the backend call fails it is restored to
    /// exactly what it was before.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a buyer is signed in, `Cart` if the cart
    /// refuses the quantity, or a backend error after rolling back.
    #[instrument(skip(self, session, product), fields(product_id = %product.id))]
    pub async fn add_to_cart<S: SessionStore>(
        &mut self,
        session: &mut AuthSession<S>,
        product: &Product,
        quantity: u32,
    ) -> Result<()> {
        session.require(&[Role::Buyer], "add items to the cart")?;

        let snapshot = self.cart.clone();
        self.cart.add_item(product, quantity)?;

        if let Err(e) = within(self.timeout, self.backend.add_to_cart(product.id, quantity)).await {
            warn!(error = %e, "Cart sync failed, rolling back");
            self.cart = snapshot;
            return Err(reported(e));
        }

        session.save_cart(&self.cart)?;
        Ok(())
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a buyer is signed in, or `Cart` if the line
    /// is missing or the quantity is refused.
    pub fn update_quantity<S: SessionStore>(
        &mut self,
        session: &mut AuthSession<S>,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<()> {
        session.require(&[Role::Buyer], "change the cart")?;
        self.cart.update_quantity(product_id, quantity)?;
        session.save_cart(&self.cart)?;
        Ok(())
    }

    /// Remove a line. Removing a missing line is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a buyer is signed in.
    pub fn remove_item<S: SessionStore>(
        &mut self,
        session: &mut AuthSession<S>,
        product_id: ProductId,
    ) -> Result<()> {
        session.require(&[Role::Buyer], "change the cart")?;
        self.cart.remove_item(product_id);
        session.save_cart(&self.cart)?;
        Ok(())
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a buyer is signed in.
    pub fn clear_cart<S: SessionStore>(&mut self, session: &mut AuthSession<S>) -> Result<()> {
        session.require(&[Role::Buyer], "change the cart")?;
        self.cart.clear();
        session.save_cart(&self.cart)?;
        Ok(())
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Validate the form, authorize payment, submit the order, and clear the
    /// cart.
    ///
    /// Nothing changes locally unless the backend accepts the order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` listing every failed field (including an empty
    /// cart), `PaymentDeclined`, or a backend error.
    #[instrument(skip(self, session, form))]
    pub async fn place_order<S: SessionStore>(
        &mut self,
        session: &mut AuthSession<S>,
        form: &CheckoutForm,
    ) -> Result<Order> {
        let buyer_id = session.require(&[Role::Buyer], "check out")?.id;

        let draft = Order::draft(
            self.cart.lines(),
            self.cart.currency(),
            form,
            &self.fees,
            buyer_id,
            Utc::now(),
        )?;
        let crumb = [("order_id", draft.id.as_str())];
        error::add_breadcrumb("checkout", "Order submitted", Some(crumb.as_slice()));

        let receipt = within(
            self.timeout,
            self.gateway.authorize(&draft.id, draft.total, &form.payment),
        )
        .await
        .map_err(reported)?;

        let request = CreateOrderRequest::for_draft(&draft, receipt.reference.clone());
        let order = match within(self.timeout, self.backend.create_order(&request)).await {
            Ok(order) => order,
            Err(err) => {
                self.release(&receipt).await;
                return Err(reported(err));
            }
        };

        self.book.commit(order.clone());
        self.cart.clear();
        session.save_cart(&self.cart)?;

        info!(order_id = %order.id, total = %order.total, "Order placed");
        Ok(order)
    }

    /// Void an authorization whose order was never created.
    async fn release(&self, receipt: &PaymentReceipt) {
        warn!(
            payment_reference = %receipt.reference,
            amount = %receipt.amount,
            "Order submission failed after payment was authorized, voiding"
        );
        if let Err(e) = within(self.timeout, self.gateway.void(receipt)).await {
            tracing::error!(
                payment_reference = %receipt.reference,
                error = %e,
                "Payment authorization could not be voided"
            );
        }
    }

    // =========================================================================
    // Order transitions
    // =========================================================================

    /// Cancel an order that has not shipped.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for sellers or another buyer's order, `NotFound`,
    /// `InvalidTransition` (locally or on a backend conflict), or a backend
    /// error.
    #[instrument(skip(self, session, order_id), fields(order_id = %order_id))]
    pub async fn cancel_order<S: SessionStore>(
        &mut self,
        session: &AuthSession<S>,
        order_id: &OrderId,
    ) -> Result<Order> {
        let user = session.require(&[Role::Buyer, Role::Admin], "cancel orders")?;
        let from = self.authorize_transition(user, order_id, OrderAction::Cancel, "cancel orders")?;

        within(self.timeout, self.backend.cancel_order(order_id))
            .await
            .map_err(|e| transition_failure(e, order_id, from, OrderAction::Cancel))?;

        Ok(self.book.cancel(order_id, Utc::now())?.clone())
    }

    /// Ask to return one item of a fulfilled order.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for sellers or another buyer's order, `NotFound`
    /// for an unknown order or item, `InvalidTransition`, or a backend error.
    #[instrument(skip(self, session, order_id, item), fields(order_id = %order_id, item = %item))]
    pub async fn request_return<S: SessionStore>(
        &mut self,
        session: &AuthSession<S>,
        order_id: &OrderId,
        item: ProductId,
    ) -> Result<Order> {
        let user = session.require(&[Role::Buyer, Role::Admin], "request returns")?;
        let from =
            self.authorize_transition(user, order_id, OrderAction::RequestReturn, "request returns")?;
        if !self
            .book
            .get(order_id)
            .is_some_and(|o| o.lines.iter().any(|line| line.product_id == item))
        {
            return Err(StorefrontError::NotFound(format!(
                "product {item} in order {order_id}"
            )));
        }

        within(self.timeout, self.backend.request_return(order_id, item))
            .await
            .map_err(|e| transition_failure(e, order_id, from, OrderAction::RequestReturn))?;

        Ok(self.book.request_return(order_id, item, Utc::now())?.clone())
    }

    /// Mark an order shipped with a tracking number.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for buyers or a seller with no item in the order,
    /// `NotFound`, `InvalidTransition`, or `Validation` for a blank tracking
    /// number.
    pub fn mark_shipped<S: SessionStore>(
        &mut self,
        session: &AuthSession<S>,
        order_id: &OrderId,
        tracking_number: &str,
    ) -> Result<Order> {
        let user = session.require(&[Role::Seller, Role::Admin], "ship orders")?;
        self.authorize_transition(user, order_id, OrderAction::Ship, "ship orders")?;
        Ok(self
            .book
            .mark_shipped(order_id, tracking_number, Utc::now())?
            .clone())
    }

    /// Mark a shipped order delivered.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for buyers or a seller with no item in the order,
    /// `NotFound`, or `InvalidTransition`.
    pub fn mark_delivered<S: SessionStore>(
        &mut self,
        session: &AuthSession<S>,
        order_id: &OrderId,
    ) -> Result<Order> {
        let user = session.require(&[Role::Seller, Role::Admin], "mark orders delivered")?;
        self.authorize_transition(user, order_id, OrderAction::Deliver, "mark orders delivered")?;
        Ok(self.book.mark_delivered(order_id, Utc::now())?.clone())
    }

    /// Check ownership and that `action` is allowed; returns the current status.
    fn authorize_transition(
        &self,
        user: &User,
        order_id: &OrderId,
        action: OrderAction,
        label: &'static str,
    ) -> Result<OrderStatus> {
        let order = self
            .book
            .get(order_id)
            .ok_or_else(|| StorefrontError::NotFound(format!("order {order_id}")))?;
        if !can_access(user, order) {
            return Err(AccessDenied::NotOwner { action: label }.into());
        }
        Ok(order.check(action)?)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Rebuild the order book from the backend.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when signed out, or a backend error (the local
    /// order book is then left as it was).
    #[instrument(skip(self, session))]
    pub async fn refresh_orders<S: SessionStore>(&mut self, session: &AuthSession<S>) -> Result<usize> {
        session.require(ANY_ROLE, "view orders")?;
        let orders = within(self.timeout, self.backend.list_orders())
            .await
            .map_err(reported)?;
        let count = orders.len();
        self.book.replace_all(orders);
        debug!(count, "Order book refreshed");
        Ok(count)
    }

    /// Orders the signed-in user may see: their own as a buyer, those with
    /// their items as a seller, all as an admin.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when signed out.
    pub fn visible_orders<S: SessionStore>(&self, session: &AuthSession<S>) -> Result<Vec<&Order>> {
        let user = session.require(ANY_ROLE, "view orders")?;
        Ok(self
            .book
            .orders()
            .iter()
            .filter(|o| can_access(user, o))
            .collect())
    }

    /// Look up one order the signed-in user may see.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when signed out, `NotFound` for an unknown or
    /// inaccessible order.
    pub fn order<S: SessionStore>(&self, session: &AuthSession<S>, order_id: &OrderId) -> Result<&Order> {
        let user = session.require(ANY_ROLE, "view orders")?;
        self.book
            .get(order_id)
            .filter(|o| can_access(user, o))
            .ok_or_else(|| StorefrontError::NotFound(format!("order {order_id}")))
    }

    /// Visible orders in one status.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` when signed out.
    pub fn orders_with_status<S: SessionStore>(
        &self,
        session: &AuthSession<S>,
        status: OrderStatus,
    ) -> Result<Vec<&Order>> {
        let mut orders = self.visible_orders(session)?;
        orders.retain(|o| o.status == status);
        Ok(orders)
    }

    /// Order counts and spend for the signed-in buyer.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a buyer is signed in.
    pub fn buyer_stats<S: SessionStore>(&self, session: &AuthSession<S>) -> Result<BuyerOrderStats> {
        let user = session.require(&[Role::Buyer], "view order stats")?;
        Ok(BuyerOrderStats::compute(
            self.book.orders(),
            user.id,
            self.cart.currency(),
        ))
    }

    /// Earnings for the signed-in seller.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a seller with a seller account is signed in.
    pub fn seller_earnings<S: SessionStore>(&self, session: &AuthSession<S>) -> Result<SellerEarnings> {
        let seller_id = signed_in_seller(session, "view seller earnings")?;
        Ok(SellerEarnings::compute(
            self.book.orders(),
            seller_id,
            &self.payouts,
            self.cart.currency(),
        ))
    }

    /// Request a payout of the signed-in seller's available balance.
    ///
    /// The payout is recorded, so the same balance cannot be requested twice.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a seller is signed in, or `Validation` when
    /// nothing is available.
    pub fn request_payout<S: SessionStore>(&mut self, session: &AuthSession<S>) -> Result<PayoutRequest> {
        let payout = self.seller_earnings(session)?.request_payout(Utc::now())?;
        info!(seller_id = %payout.seller_id, amount = %payout.amount, "Payout requested");
        self.payouts.record(payout.clone());
        Ok(payout)
    }

    /// Payouts the signed-in seller has requested, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless a seller is signed in.
    pub fn payout_history<S: SessionStore>(&self, session: &AuthSession<S>) -> Result<Vec<&PayoutRequest>> {
        let seller_id = signed_in_seller(session, "view payouts")?;
        Ok(self.payouts.for_seller(seller_id).collect())
    }

    /// Platform revenue and the `top_n` sellers by gross sales.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless an admin is signed in.
    pub fn platform_earnings<S: SessionStore>(
        &self,
        session: &AuthSession<S>,
        fees: &[PlatformFee],
        top_n: usize,
    ) -> Result<PlatformEarnings> {
        session.require(&[Role::Admin], "view platform earnings")?;
        Ok(PlatformEarnings::compute(
            self.book.orders(),
            fees,
            self.cart.currency(),
            top_n,
        ))
    }
}

/// Whether `user` may see and act on `order`.
fn can_access(user: &User, order: &Order) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Buyer => order.buyer_id == user.id,
        Role::Seller => user.seller_id.is_some_and(|s| order.involves_seller(s)),
    }
}

fn signed_in_seller<S: SessionStore>(session: &AuthSession<S>, action: &'static str) -> Result<SellerId> {
    let user = session.require(&[Role::Seller], action)?;
    Ok(user.seller_id.ok_or(AccessDenied::NotOwner { action })?)
}

/// Run a backend call under the request timeout.
async fn within<T>(
    timeout: Duration,
    call: impl Future<Output = std::result::Result<T, BackendError>>,
) -> std::result::Result<T, BackendError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(BackendError::Timeout(timeout)))
}

fn reported(err: BackendError) -> StorefrontError {
    let err = StorefrontError::from(err);
    err.report();
    err
}

/// A backend conflict means the order moved on server-side.
fn transition_failure(
    err: BackendError,
    order_id: &OrderId,
    from: OrderStatus,
    action: OrderAction,
) -> StorefrontError {
    match err {
        BackendError::Conflict(reason) => {
            warn!(%order_id, %action, %reason, "Backend refused transition");
            StorefrontError::InvalidTransition(TransitionError {
                order_id: order_id.clone(),
                from,
                action,
            })
        }
        other => reported(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use rust_decimal_macros::dec;

    use bazaar_core::{SellerId, UserId};

    use super::*;
    use crate::backend::{PaymentReceipt, SimulatedGateway};
    use crate::cart::CartError;
    use crate::cart::tests::product;
    use crate::orders::checkout::tests::form;
    use crate::orders::{Field, OrderLine, PaymentDetails};
    use crate::session::MemoryStore;

    #[derive(Default)]
    struct FakeBackend {
        fail_cart: bool,
        fail_orders: bool,
        conflict: bool,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
        orders: Mutex<Vec<Order>>,
    }

    impl FakeBackend {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl MarketplaceBackend for FakeBackend {
        async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> std::result::Result<(), BackendError> {
            self.record(format!("add {product_id} x{quantity}"));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_cart {
                return Err(BackendError::Unavailable { status: 503 });
            }
            Ok(())
        }

        async fn list_orders(&self) -> std::result::Result<Vec<Order>, BackendError> {
            self.record("list".to_string());
            Ok(self.orders.lock().unwrap().clone())
        }

        async fn create_order(&self, request: &CreateOrderRequest) -> std::result::Result<Order, BackendError> {
            self.record(format!("create {}", request.order_id));
            if self.fail_orders {
                return Err(BackendError::Unavailable { status: 503 });
            }
            let order = Order {
                id: request.order_id.clone(),
                buyer_id: UserId::new(1),
                lines: request.cart.clone(),
                status: OrderStatus::Processing,
                subtotal: request.totals.subtotal,
                shipping_fee: request.totals.shipping_fee,
                tax: request.totals.tax,
                total: request.totals.total,
                commission: request.totals.commission,
                payment_method: request.payment.method,
                shipping: request.shipping.clone(),
                created_at: Utc::now(),
                tracking_number: None,
                estimated_delivery: None,
                shipped_at: None,
                delivered_at: None,
                cancelled_at: None,
                returns: Vec::new(),
            };
            self.orders.lock().unwrap().push(order.clone());
            Ok(order)
        }

        async fn cancel_order(&self, order_id: &OrderId) -> std::result::Result<(), BackendError> {
            self.record(format!("cancel {order_id}"));
            if self.conflict {
                return Err(BackendError::Conflict("order already shipped".to_string()));
            }
            Ok(())
        }

        async fn request_return(&self, order_id: &OrderId, item: ProductId) -> std::result::Result<(), BackendError> {
            self.record(format!("return {order_id} {item}"));
            Ok(())
        }
    }

    struct DecliningGateway;

    impl PaymentGateway for DecliningGateway {
        async fn authorize(
            &self,
            _order_id: &OrderId,
            _amount: bazaar_core::Price,
            _payment: &PaymentDetails,
        ) -> std::result::Result<PaymentReceipt, BackendError> {
            Err(BackendError::PaymentDeclined("insufficient funds".to_string()))
        }

        async fn void(&self, _receipt: &PaymentReceipt) -> std::result::Result<(), BackendError> {
            Ok(())
        }
    }

    /// Approves every payment and remembers which ones were voided.
    #[derive(Default)]
    struct RecordingGateway {
        voided: Mutex<Vec<String>>,
    }

    impl PaymentGateway for RecordingGateway {
        async fn authorize(
            &self,
            order_id: &OrderId,
            amount: bazaar_core::Price,
            payment: &PaymentDetails,
        ) -> std::result::Result<PaymentReceipt, BackendError> {
            SimulatedGateway::new(Duration::ZERO)
                .authorize(order_id, amount, payment)
                .await
        }

        async fn void(&self, receipt: &PaymentReceipt) -> std::result::Result<(), BackendError> {
            self.voided.lock().unwrap().push(receipt.reference.clone());
            Ok(())
        }
    }

    fn config() -> StorefrontConfig {
        StorefrontConfig::from_vars(|_| None).unwrap()
    }

    fn market(backend: FakeBackend) -> Marketplace<FakeBackend, SimulatedGateway> {
        Marketplace::new(backend, SimulatedGateway::new(Duration::ZERO), &config())
    }

    fn session_as(user: User) -> AuthSession<MemoryStore> {
        let mut session = AuthSession::restore(MemoryStore::new()).unwrap();
        session.login(user).unwrap();
        session
    }

    fn buyer() -> AuthSession<MemoryStore> {
        session_as(User::buyer(UserId::new(1), "Ada", "ada@example.com"))
    }

    fn seller(seller_id: i32) -> AuthSession<MemoryStore> {
        session_as(User::seller(UserId::new(2), SellerId::new(seller_id), "Sam", "sam@example.com"))
    }

    fn admin() -> AuthSession<MemoryStore> {
        session_as(User::admin(UserId::new(3), "Root", "root@example.com"))
    }

    async fn placed_order<P: PaymentGateway>(
        market: &mut Marketplace<FakeBackend, P>,
        session: &mut AuthSession<MemoryStore>,
    ) -> Order {
        market
            .add_to_cart(session, &product(1, dec!(40.00), 10), 3)
            .await
            .unwrap();
        market.place_order(session, &form()).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_to_cart_syncs_and_persists() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();

        market
            .add_to_cart(&mut session, &product(1, dec!(12.00), 5), 2)
            .await
            .unwrap();

        assert_eq!(market.cart().item_count(), 2);
        assert_eq!(market.backend().calls(), vec!["add 1 x2"]);
        assert_eq!(session.load_cart().unwrap().as_ref(), Some(market.cart()));
    }

    #[tokio::test]
    async fn test_add_to_cart_rolls_back_on_backend_failure() {
        let mut market = market(FakeBackend {
            fail_cart: true,
            ..FakeBackend::default()
        });
        let mut session = buyer();
        let before = market.cart().clone();

        let err = market
            .add_to_cart(&mut session, &product(1, dec!(12.00), 5), 2)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(market.cart(), &before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out_and_rolls_back() {
        let mut market = market(FakeBackend {
            delay: Some(Duration::from_secs(120)),
            ..FakeBackend::default()
        });
        let mut session = buyer();

        let err = market
            .add_to_cart(&mut session, &product(1, dec!(12.00), 5), 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorefrontError::BackendUnavailable(BackendError::Timeout(_))
        ));
        assert!(market.cart().is_empty());
    }

    #[tokio::test]
    async fn test_cart_refusal_never_reaches_backend() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();

        let err = market
            .add_to_cart(&mut session, &product(1, dec!(12.00), 1), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, StorefrontError::Cart(CartError::InsufficientStock { .. })));
        assert!(market.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_sellers_cannot_shop() {
        let mut market = market(FakeBackend::default());
        let mut session = seller(101);

        let err = market
            .add_to_cart(&mut session, &product(1, dec!(12.00), 5), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, StorefrontError::Forbidden(AccessDenied::WrongRole { .. })));
    }

    #[tokio::test]
    async fn test_place_order_clears_cart_and_records_order() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();
        market
            .add_to_cart(&mut session, &product(1, dec!(40.00), 10), 3)
            .await
            .unwrap();
        let lines: Vec<OrderLine> = market.cart().lines().iter().map(OrderLine::from).collect();

        let order = market.place_order(&mut session, &form()).await.unwrap();

        assert_eq!(order.total.amount, dec!(129.60));
        assert_eq!(order.lines, lines);
        assert!(market.cart().is_empty());
        assert_eq!(session.load_cart().unwrap().map(|c| c.len()), Some(0));
        assert_eq!(market.order_book().get(&order.id), Some(&order));
    }

    #[tokio::test]
    async fn test_place_order_with_empty_cart_fails() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();

        let err = market.place_order(&mut session, &form()).await.unwrap_err();

        match err {
            StorefrontError::Validation(errors) => assert!(errors.has(Field::Cart)),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(market.order_book().is_empty());
        assert!(market.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_declined_payment_keeps_cart() {
        let mut market = Marketplace::new(FakeBackend::default(), DecliningGateway, &config());
        let mut session = buyer();
        market
            .add_to_cart(&mut session, &product(1, dec!(40.00), 10), 1)
            .await
            .unwrap();

        let err = market.place_order(&mut session, &form()).await.unwrap_err();

        assert!(matches!(err, StorefrontError::PaymentDeclined(_)));
        assert_eq!(market.cart().len(), 1);
        assert!(market.order_book().is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_voids_payment() {
        let backend = FakeBackend {
            fail_orders: true,
            ..FakeBackend::default()
        };
        let mut market = Marketplace::new(backend, RecordingGateway::default(), &config());
        let mut session = buyer();
        market
            .add_to_cart(&mut session, &product(1, dec!(40.00), 10), 1)
            .await
            .unwrap();

        let err = market.place_order(&mut session, &form()).await.unwrap_err();

        assert!(matches!(
            err,
            StorefrontError::BackendUnavailable(BackendError::Unavailable { status: 503 })
        ));
        let voided = market.gateway().voided.lock().unwrap().clone();
        assert_eq!(voided.len(), 1);
        assert!(voided[0].starts_with("PAY-"));
        assert_eq!(market.cart().len(), 1);
        assert!(market.order_book().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_order_keeps_payment() {
        let mut market = Marketplace::new(FakeBackend::default(), RecordingGateway::default(), &config());
        let mut session = buyer();

        placed_order(&mut market, &mut session).await;

        assert!(market.gateway().voided.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_conflict_leaves_order_unchanged() {
        let mut market = market(FakeBackend {
            conflict: true,
            ..FakeBackend::default()
        });
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;

        let err = market.cancel_order(&session, &order.id).await.unwrap_err();

        match err {
            StorefrontError::InvalidTransition(e) => {
                assert_eq!(e.from, OrderStatus::Processing);
                assert_eq!(e.action, OrderAction::Cancel);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
        assert_eq!(
            market.order_book().get(&order.id).unwrap().status,
            OrderStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_be_cancelled() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;

        market
            .mark_shipped(&seller(101), &order.id, "TRK-1")
            .unwrap();
        let err = market.cancel_order(&session, &order.id).await.unwrap_err();

        assert!(matches!(err, StorefrontError::InvalidTransition(_)));
        assert!(!market.backend().calls().iter().any(|c| c.starts_with("cancel")));
    }

    #[tokio::test]
    async fn test_role_and_ownership_gates() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;

        let other_seller = market.mark_shipped(&seller(102), &order.id, "TRK-1").unwrap_err();
        assert!(matches!(
            other_seller,
            StorefrontError::Forbidden(AccessDenied::NotOwner { .. })
        ));
        let buyer_ships = market.mark_shipped(&session, &order.id, "TRK-1").unwrap_err();
        assert!(matches!(buyer_ships, StorefrontError::Forbidden(_)));

        let other_buyer = session_as(User::buyer(UserId::new(9), "Eve", "eve@example.com"));
        let err = market.cancel_order(&other_buyer, &order.id).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Forbidden(_)));

        assert!(market.cancel_order(&admin(), &order.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_return_after_delivery() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;

        let early = market
            .request_return(&session, &order.id, ProductId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(early, StorefrontError::InvalidTransition(_)));

        let shipper = seller(101);
        market.mark_shipped(&shipper, &order.id, "TRK-1").unwrap();
        market.mark_delivered(&shipper, &order.id).unwrap();

        let unknown = market
            .request_return(&session, &order.id, ProductId::new(42))
            .await
            .unwrap_err();
        assert!(matches!(unknown, StorefrontError::NotFound(_)));

        let returned = market
            .request_return(&session, &order.id, ProductId::new(1))
            .await
            .unwrap();
        assert_eq!(returned.status, OrderStatus::Fulfilled);
        assert_eq!(returned.returns.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rebuilds_order_book() {
        let backend = FakeBackend::default();
        let mut market = market(backend);
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;
        market.logout(&mut session).unwrap();
        assert!(market.order_book().is_empty());

        market
            .login(&mut session, User::buyer(UserId::new(1), "Ada", "ada@example.com"))
            .unwrap();
        let count = market.refresh_orders(&session).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(market.order(&session, &order.id).unwrap().id, order.id);
    }

    #[tokio::test]
    async fn test_dashboards() {
        let mut market = market(FakeBackend::default());
        let mut session = buyer();
        let order = placed_order(&mut market, &mut session).await;

        let stats = market.buyer_stats(&session).unwrap();
        assert_eq!(stats.in_progress, 1);

        let shipper = seller(101);
        assert!(market.request_payout(&shipper).is_err());
        market.mark_shipped(&shipper, &order.id, "TRK-1").unwrap();
        market.mark_delivered(&shipper, &order.id).unwrap();
        let payout = market.request_payout(&shipper).unwrap();
        assert_eq!(payout.amount.amount, dec!(114.00));
        let again = market.request_payout(&shipper).unwrap_err();
        match again {
            StorefrontError::Validation(errors) => assert!(errors.has(Field::PayoutAmount)),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(market.payout_history(&shipper).unwrap(), vec![&payout]);
        assert!(market.payout_history(&seller(102)).unwrap().is_empty());
        assert!(market.payout_history(&session).is_err());
        let earnings = market.seller_earnings(&shipper).unwrap();
        assert_eq!(earnings.paid_out.amount, dec!(114.00));
        assert_eq!(earnings.transactions.len(), 1);
        assert_eq!(earnings.transactions[0].order_id, order.id);

        assert!(market.platform_earnings(&session, &[], 5).is_err());
        let platform = market.platform_earnings(&admin(), &[], 5).unwrap();
        assert_eq!(platform.total.amount, dec!(6.00));

        assert_eq!(market.visible_orders(&seller(102)).unwrap().len(), 0);
        assert_eq!(
            market
                .orders_with_status(&admin(), OrderStatus::Fulfilled)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_next_user_starts_with_empty_cart_and_orders() {
        let ada = User::buyer(UserId::new(1), "Ada", "ada@example.com");
        let eve = User::buyer(UserId::new(9), "Eve", "eve@example.com");
        let mut market = market(FakeBackend::default());
        let mut session = AuthSession::restore(MemoryStore::new()).unwrap();
        market.login(&mut session, ada.clone()).unwrap();
        placed_order(&mut market, &mut session).await;
        market
            .add_to_cart(&mut session, &product(2, dec!(10.00), 5), 2)
            .await
            .unwrap();

        // Signing in again as the same user keeps everything.
        market.login(&mut session, ada).unwrap();
        assert_eq!(market.cart().item_count(), 2);
        assert_eq!(market.order_book().len(), 1);

        market.login(&mut session, eve).unwrap();

        assert!(market.cart().is_empty());
        assert!(market.order_book().is_empty());
        assert_eq!(session.load_cart().unwrap(), None);
        assert!(market.visible_orders(&session).unwrap().is_empty());

    }

    #[tokio::test]
    async fn test_fresh_session_for_another_user_drops_cart() {
        let mut market = market(FakeBackend::default());
        let mut first = AuthSession::restore(MemoryStore::new()).unwrap();
        market
            .login(&mut first, User::buyer(UserId::new(1), "Ada", "ada@example.com"))
            .unwrap();
        market
            .add_to_cart(&mut first, &product(2, dec!(10.00), 5), 1)
            .await
            .unwrap();

        let mut second = AuthSession::restore(MemoryStore::new()).unwrap();
        market
            .login(&mut second, User::buyer(UserId::new(9), "Eve", "eve@example.com"))
            .unwrap();

        assert!(market.cart().is_empty());
        assert_eq!(second.load_cart().unwrap(), None);
    }
}
