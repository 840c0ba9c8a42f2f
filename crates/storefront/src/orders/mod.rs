//! Checkout and the order lifecycle.

pub mod checkout;
pub mod lifecycle;

pub use checkout::{
    BillingAddress, CardDetails, CheckoutForm, Field, FieldError, PaymentDetails, ShippingInfo,
    ValidationErrors,
};
pub use lifecycle::{
    ESTIMATED_DELIVERY_DAYS, Order, OrderAction, OrderBook, OrderError, OrderLine, ReturnRequest,
    TransitionError,
};
