//! Checkout form and its validation.
//!
//! Validation never stops at the first problem: every failed field is
//! reported so the buyer can fix them all at once.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bazaar_core::PaymentMethod;

/// Country used when the buyer leaves it blank.
pub const DEFAULT_COUNTRY: &str = "United States";

static EXPIRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}/[0-9]{2}$").expect("Invalid regex"));

static CARD_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{16}$").expect("Invalid regex"));

static CVV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{3}$").expect("Invalid regex"));

/// A form field that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Cart,
    ShippingAddress,
    City,
    State,
    ZipCode,
    Phone,
    CardNumber,
    ExpiryDate,
    Cvv,
    NameOnCard,
    BillingAddress,
    BillingCity,
    BillingState,
    BillingZipCode,
    TrackingNumber,
    PayoutAmount,
}

impl Field {
    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::ShippingAddress => "shippingAddress",
            Self::City => "city",
            Self::State => "state",
            Self::ZipCode => "zipCode",
            Self::Phone => "phone",
            Self::CardNumber => "cardNumber",
            Self::ExpiryDate => "expiryDate",
            Self::Cvv => "cvv",
            Self::NameOnCard => "nameOnCard",
            Self::BillingAddress => "billingAddress",
            Self::BillingCity => "billingCity",
            Self::BillingState => "billingState",
            Self::BillingZipCode => "billingZipCode",
            Self::TrackingNumber => "trackingNumber",
            Self::PayoutAmount => "payoutAmount",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed field and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field at fault.
    pub field: Field,
    /// User-facing explanation.
    pub message: String,
}

/// Every field that failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// No errors yet.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// A single failed field.
    #[must_use]
    pub fn single(field: Field, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    /// Record a failed field.
    pub fn push(&mut self, field: Field, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Fold another set of errors into this one.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The failed fields, in the order they were checked.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Whether a particular field failed.
    #[must_use]
    pub fn has(&self, field: Field) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(())` if empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one field failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.iter().map(|e| e.field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

fn require(errors: &mut ValidationErrors, value: &str, field: Field, message: &str) {
    if value.trim().is_empty() {
        errors.push(field, message);
    }
}

/// Where the order ships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub shipping_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_notes: Option<String>,
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

impl Default for ShippingInfo {
    fn default() -> Self {
        Self {
            shipping_address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            country: default_country(),
            phone: String::new(),
            order_notes: None,
        }
    }
}

impl ShippingInfo {
    /// Check that address, city, state, zip and phone are filled in.
    ///
    /// # Errors
    ///
    /// Returns every missing field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        require(&mut errors, &self.shipping_address, Field::ShippingAddress, "Shipping address is required");
        require(&mut errors, &self.city, Field::City, "City is required");
        require(&mut errors, &self.state, Field::State, "State is required");
        require(&mut errors, &self.zip_code, Field::ZipCode, "ZIP code is required");
        require(&mut errors, &self.phone, Field::Phone, "Phone number is required");
        errors.into_result()
    }
}

/// Billing address used when it differs from shipping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingAddress {
    pub billing_address: String,
    pub billing_city: String,
    pub billing_state: String,
    pub billing_zip_code: String,
}

impl BillingAddress {
    fn validate(&self, errors: &mut ValidationErrors) {
        require(errors, &self.billing_address, Field::BillingAddress, "Billing address is required");
        require(errors, &self.billing_city, Field::BillingCity, "Billing city is required");
        require(errors, &self.billing_state, Field::BillingState, "Billing state is required");
        require(errors, &self.billing_zip_code, Field::BillingZipCode, "Billing ZIP code is required");
    }
}

/// Card details entered at checkout. Never persisted or sent to the backend.
#[derive(Clone)]
pub struct CardDetails {
    /// Card number; spaces are allowed.
    pub number: SecretString,
    /// Expiry as `MM/YY`.
    pub expiry: String,
    /// Three-digit security code.
    pub cvv: SecretString,
    /// Cardholder name.
    pub name_on_card: String,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("number", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .field("cvv", &"[REDACTED]")
            .field("name_on_card", &self.name_on_card)
            .finish()
    }
}

impl CardDetails {
    /// Last four digits of the card number, for receipts.
    #[must_use]
    pub fn last_four(&self) -> String {
        let digits: String = self
            .number
            .expose_secret()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        digits
            .get(digits.len().saturating_sub(4)..)
            .unwrap_or_default()
            .to_string()
    }

    fn validate(&self, errors: &mut ValidationErrors) {
        let number: String = self
            .number
            .expose_secret()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if !CARD_NUMBER_RE.is_match(&number) {
            errors.push(Field::CardNumber, "Valid 16-digit card number is required");
        }
        if !EXPIRY_RE.is_match(self.expiry.trim()) {
            errors.push(Field::ExpiryDate, "Valid expiry date (MM/YY) is required");
        }
        if !CVV_RE.is_match(self.cvv.expose_secret().trim()) {
            errors.push(Field::Cvv, "Valid 3-digit CVV is required");
        }
        require(errors, &self.name_on_card, Field::NameOnCard, "Name on card is required");
    }
}

/// Chosen payment method and its details.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    /// Selected method.
    pub method: PaymentMethod,
    /// Card details, required when `method` is `Card`.
    pub card: Option<CardDetails>,
    /// Separate billing address; `None` means same as shipping.
    pub billing: Option<BillingAddress>,
}

impl PaymentDetails {
    /// Pay with a card, billing to the shipping address.
    #[must_use]
    pub const fn card(card: CardDetails) -> Self {
        Self {
            method: PaymentMethod::Card,
            card: Some(card),
            billing: None,
        }
    }

    /// Pay through an external gateway redirect.
    #[must_use]
    pub const fn gateway(method: PaymentMethod) -> Self {
        Self {
            method,
            card: None,
            billing: None,
        }
    }

    /// Check the method-specific fields.
    ///
    /// # Errors
    ///
    /// Returns every failed card and billing field.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.method.requires_card_details() {
            match &self.card {
                Some(card) => card.validate(&mut errors),
                None => {
                    errors.push(Field::CardNumber, "Valid 16-digit card number is required");
                    errors.push(Field::ExpiryDate, "Valid expiry date (MM/YY) is required");
                    errors.push(Field::Cvv, "Valid 3-digit CVV is required");
                    errors.push(Field::NameOnCard, "Name on card is required");
                }
            }
        }

        if let Some(billing) = &self.billing {
            billing.validate(&mut errors);
        }

        errors.into_result()
    }
}

/// Everything submitted at checkout.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub shipping: ShippingInfo,
    pub payment: PaymentDetails,
}

impl CheckoutForm {
    /// Validate shipping and payment together.
    ///
    /// # Errors
    ///
    /// Returns the union of shipping and payment failures.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = self.shipping.validate() {
            errors.extend(e);
        }
        if let Err(e) = self.payment.validate() {
            errors.extend(e);
        }
        errors.into_result()
    }
}
