//! Unified error handling with Sentry integration.
//!
//! Every storefront operation returns [`StorefrontError`]. None of its variants
//! is fatal: callers render [`StorefrontError::user_message`] and offer a retry
//! when [`StorefrontError::is_retryable`] says so. Backend failures are
//! reported to Sentry by [`StorefrontError::report`].

use thiserror::Error;

use crate::backend::BackendError;
use crate::cart::CartError;
use crate::config::ConfigError;
use crate::orders::{OrderError, TransitionError, ValidationErrors};
use crate::session::{AccessDenied, SessionError};

/// Storefront error type.
#[derive(Debug, Error)]
pub enum StorefrontError {
    /// Input failed validation; lists every failed field.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A cart mutation was refused.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// The order is not in a state that allows the action.
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    /// A referenced order, line, or item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend could not be reached or failed; worth retrying.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(BackendError),

    /// The backend refused the request.
    #[error("Backend error: {0}")]
    BackendRejected(BackendError),

    /// The payment was declined.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// The signed-in user may not perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(#[from] AccessDenied),

    /// Durable session storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] SessionError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<OrderError> for StorefrontError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(id) => Self::NotFound(format!("order {id}")),
            OrderError::InvalidTransition(e) => Self::InvalidTransition(e),
            OrderError::Validation(e) => Self::Validation(e),
            e @ OrderError::UnknownItem { .. } => Self::NotFound(e.to_string()),
        }
    }
}

impl From<BackendError> for StorefrontError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PaymentDeclined(reason) => Self::PaymentDeclined(reason),
            BackendError::NotFound(what) => Self::NotFound(what),
            BackendError::Rejected { field_errors, .. } if !field_errors.is_empty() => {
                Self::Validation(ValidationErrors::from(field_errors))
            }
            e if e.is_retryable() => Self::BackendUnavailable(e),
            e => Self::BackendRejected(e),
        }
    }
}

impl StorefrontError {
    /// Whether the same action may succeed if tried again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Storage(_))
    }

    /// Message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(errors) => errors
                .errors()
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join(". "),
            Self::Cart(err) => match err {
                CartError::InsufficientStock { available, .. } => {
                    format!("Only {available} left in stock")
                }
                CartError::InvalidQuantity { .. } => "Please choose a valid quantity".to_string(),
                CartError::InvalidPrice { .. } => "This item is not available for sale".to_string(),
                CartError::LineNotFound(_) => "That item is no longer in your cart".to_string(),
                CartError::CurrencyMismatch { .. } | CartError::DuplicateLine(_) => {
                    "This item cannot be added to your cart".to_string()
                }
            },
            Self::InvalidTransition(e) => {
                format!("Order {} is {} and cannot be changed that way", e.order_id, e.from)
            }
            Self::NotFound(_) => "We couldn't find that".to_string(),
            Self::BackendUnavailable(_) => {
                "The marketplace is unavailable right now. Please try again.".to_string()
            }
            Self::BackendRejected(_) => "The marketplace could not complete the request".to_string(),
            Self::PaymentDeclined(reason) => format!("Payment declined: {reason}"),
            Self::Forbidden(e) => {
                let mut message = e.to_string();
                if let Some(first) = message.get_mut(0..1) {
                    first.make_ascii_uppercase();
                }
                message
            }
            Self::Storage(_) => "Your session could not be saved. Please try again.".to_string(),
            Self::Config(_) => "The storefront is misconfigured".to_string(),
        }
    }

    /// Log the error and capture backend failures to Sentry.
    pub fn report(&self) {
        match self {
            Self::BackendUnavailable(_) | Self::BackendRejected(_) | Self::Storage(_) => {
                let event_id = sentry::capture_error(self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Storefront error"
                );
            }
            _ => tracing::warn!(error = %self, "Storefront action refused"),
        }
    }
}

/// Result type alias for `StorefrontError`.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Set the Sentry user context.
///
/// Call this after login to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
