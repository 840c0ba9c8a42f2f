//! Price breakdown for a cart.
//!
//! Pure computation over a cart snapshot and a [`FeeSchedule`]:
//!
//! 1. `subtotal` - sum of line totals
//! 2. `shipping` - free once `subtotal >= shipping_threshold`, otherwise the flat fee
//! 3. `tax` - `subtotal x tax_rate` (shipping is not taxed)
//! 4. `commission` - `subtotal x commission_rate`, deducted from seller proceeds
//! 5. `total` - `subtotal + shipping + tax`; commission is never charged to the buyer
//!
//! Intermediate values keep full precision. [`PriceBreakdown::rounded`] rounds
//! each field half-up to two decimals for display or persistence.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{CurrencyCode, Price, Rate, round_currency};

use crate::cart::CartLine;

/// Shipping, tax, and commission configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Subtotal at or above which shipping is free.
    pub shipping_threshold: Decimal,
    /// Shipping charged below the threshold.
    pub flat_shipping_fee: Decimal,
    /// Sales tax applied to the subtotal.
    pub tax_rate: Rate,
    /// Platform commission applied to the subtotal.
    pub commission_rate: Rate,
}

impl Default for FeeSchedule {
    /// $50 free-shipping threshold, $5 flat shipping, 8% tax, 5% commission.
    fn default() -> Self {
        Self {
            shipping_threshold: Decimal::new(50, 0),
            flat_shipping_fee: Decimal::new(500, 2),
            tax_rate: Rate::new(Decimal::new(8, 2)).unwrap_or(Rate::ZERO),
            commission_rate: Rate::new(Decimal::new(5, 2)).unwrap_or(Rate::ZERO),
        }
    }
}

impl FeeSchedule {
    /// Shipping due on a subtotal.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping_fee
        }
    }
}

/// Immutable price snapshot for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Sum of line totals.
    pub subtotal: Price,
    /// Shipping fee.
    pub shipping: Price,
    /// Tax on the subtotal.
    pub tax: Price,
    /// Platform commission, informational for the buyer.
    pub commission: Price,
    /// Amount the buyer pays.
    pub total: Price,
    /// Threshold the subtotal was compared against.
    shipping_threshold: Decimal,
}

impl PriceBreakdown {
    /// Copy with every amount rounded half-up to two decimals.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            subtotal: self.subtotal.rounded(),
            shipping: self.shipping.rounded(),
            tax: self.tax.rounded(),
            commission: self.commission.rounded(),
            total: self.total.rounded(),
            shipping_threshold: self.shipping_threshold,
        }
    }

    /// Whether shipping is free.
    #[must_use]
    pub fn has_free_shipping(&self) -> bool {
        self.shipping.is_zero()
    }

    /// How much more subtotal would qualify for free shipping.
    #[must_use]
    pub fn amount_to_free_shipping(&self) -> Price {
        let remaining = (self.shipping_threshold - self.subtotal.amount).max(Decimal::ZERO);
        Price::new(round_currency(remaining), self.subtotal.currency_code)
    }

    /// What the sellers receive after commission.
    #[must_use]
    pub fn seller_proceeds(&self) -> Price {
        Price::new(
            self.subtotal.amount - self.commission.amount,
            self.subtotal.currency_code,
        )
    }
}

/// Price a set of cart lines.
#[must_use]
pub fn calculate(lines: &[CartLine], currency: CurrencyCode, schedule: &FeeSchedule) -> PriceBreakdown {
    let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
    breakdown_for_subtotal(subtotal, currency, schedule)
}

/// Price a bare subtotal.
#[must_use]
pub fn breakdown_for_subtotal(
    subtotal: Decimal,
    currency: CurrencyCode,
    schedule: &FeeSchedule,
) -> PriceBreakdown {
    let shipping = schedule.shipping_for(subtotal);
    let tax = schedule.tax_rate.apply(subtotal);
    let commission = schedule.commission_rate.apply(subtotal);
    let total = subtotal + shipping + tax;

    PriceBreakdown {
        subtotal: Price::new(subtotal, currency),
        shipping: Price::new(shipping, currency),
        tax: Price::new(tax, currency),
        commission: Price::new(commission, currency),
        total: Price::new(total, currency),
        shipping_threshold: schedule.shipping_threshold,
    }
}
