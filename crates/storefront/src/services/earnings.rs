//! Dashboard aggregates over the order book.
//!
//! Cancelled orders never count towards sales, commission, or spend.
//! Commission always comes from the amount recorded on each order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bazaar_core::{
    CurrencyCode, EarningKind, OrderId, OrderStatus, Price, ProductId, SellerId, UserId, round_currency,
};

use crate::orders::{Field, Order, OrderLine, ValidationErrors};

/// Fee charged to a seller for account verification.
pub const VERIFICATION_FEE: Decimal = Decimal::from_parts(2000, 0, 0, false, 2);

/// Order counts and spend for one buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerOrderStats {
    pub total_orders: usize,
    /// Processing or shipped.
    pub in_progress: usize,
    pub fulfilled: usize,
    pub cancelled: usize,
    /// Sum of order totals, excluding cancelled orders.
    pub total_spent: Price,
}

impl BuyerOrderStats {
    /// Aggregate `buyer_id`'s orders.
    #[must_use]
    pub fn compute(orders: &[Order], buyer_id: UserId, currency: CurrencyCode) -> Self {
        let mut stats = Self {
            total_orders: 0,
            in_progress: 0,
            fulfilled: 0,
            cancelled: 0,
            total_spent: Price::zero(currency),
        };
        for order in orders.iter().filter(|o| o.buyer_id == buyer_id) {
            stats.total_orders += 1;
            match order.status {
                OrderStatus::Processing | OrderStatus::Shipped => stats.in_progress += 1,
                OrderStatus::Fulfilled => stats.fulfilled += 1,
                OrderStatus::Cancelled => {
                    stats.cancelled += 1;
                    continue;
                }
            }
            stats.total_spent.amount += order.total.amount;
        }
        stats
    }
}

/// Earnings for one seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerEarnings {
    pub seller_id: SellerId,
    /// Orders containing at least one of the seller's items.
    pub order_count: usize,
    /// Sales of the seller's items before commission.
    pub gross_sales: Price,
    /// The seller's share of the commission recorded on each order.
    pub commission: Price,
    /// Gross sales minus commission.
    pub net_earnings: Price,
    /// Net earnings from fulfilled orders not yet paid out.
    pub available_balance: Price,
    /// Net earnings from orders still in flight.
    pub pending_balance: Price,
    /// Sum of payouts already requested.
    pub paid_out: Price,
    /// One entry per sold line, newest order first. Cancelled sales are
    /// listed with their status but excluded from every total.
    pub transactions: Vec<SellerTransaction>,
}

/// One of the seller's lines on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerTransaction {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Line total before commission.
    pub amount: Price,
    pub commission: Price,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
}

/// A requested payout of a seller's available balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub seller_id: SellerId,
    pub amount: Price,
    pub requested_at: DateTime<Utc>,
}

/// Every payout requested so far, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutLedger {
    payouts: Vec<PayoutRequest>,
}

impl PayoutLedger {
    #[must_use]
    pub const fn new() -> Self {
        Self { payouts: Vec::new() }
    }

    /// Append a granted payout.
    pub fn record(&mut self, payout: PayoutRequest) {
        debug!(seller_id = %payout.seller_id, amount = %payout.amount, "Payout recorded");
        self.payouts.push(payout);
    }

    /// Payouts requested by `seller_id`, oldest first.
    pub fn for_seller(&self, seller_id: SellerId) -> impl Iterator<Item = &PayoutRequest> {
        self.payouts.iter().filter(move |p| p.seller_id == seller_id)
    }

    /// Total requested by `seller_id`.
    #[must_use]
    pub fn paid_out(&self, seller_id: SellerId) -> Decimal {
        self.for_seller(seller_id).map(|p| p.amount.amount).sum()
    }
}

/// Part of the commission stored on `order` that falls on `sales`.
///
/// The commission is split by each seller's share of the order subtotal, so
/// later changes to the fee schedule never alter past orders.
fn commission_share(order: &Order, sales: Decimal) -> Decimal {
    if order.subtotal.amount.is_zero() {
        Decimal::ZERO
    } else {
        order.commission.amount * sales / order.subtotal.amount
    }
}

impl SellerEarnings {
    /// Aggregate the seller's share of every non-cancelled order, less what
    /// `ledger` says was already paid out.
    #[must_use]
    pub fn compute(
        orders: &[Order],
        seller_id: SellerId,
        ledger: &PayoutLedger,
        currency: CurrencyCode,
    ) -> Self {
        let money = |amount| Price::new(round_currency(amount), currency);
        let mut order_count = 0;
        let mut gross = Decimal::ZERO;
        let mut commission = Decimal::ZERO;
        let mut fulfilled = Decimal::ZERO;
        let mut pending = Decimal::ZERO;
        let mut transactions = Vec::new();

        for order in orders {
            let lines: Vec<&OrderLine> = order
                .lines
                .iter()
                .filter(|line| line.seller_id == seller_id)
                .collect();
            if lines.is_empty() {
                continue;
            }
            transactions.extend(lines.iter().map(|line| SellerTransaction {
                order_id: order.id.clone(),
                product_id: line.product_id,
                product_name: line.name.clone(),
                quantity: line.quantity,
                amount: money(line.line_total()),
                commission: money(commission_share(order, line.line_total())),
                status: order.status,
                placed_at: order.created_at,
            }));
            if order.status == OrderStatus::Cancelled {
                continue;
            }

            let sales: Decimal = lines.iter().map(|line| line.line_total()).sum();
            let cut = commission_share(order, sales);
            order_count += 1;
            gross += sales;
            commission += cut;
            if order.status == OrderStatus::Fulfilled {
                fulfilled += sales - cut;
            } else {
                pending += sales - cut;
            }
        }
        transactions.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));

        let paid_out = ledger.paid_out(seller_id);
        Self {
            seller_id,
            order_count,
            gross_sales: money(gross),
            commission: money(commission),
            net_earnings: money(gross - commission),
            available_balance: money((fulfilled - paid_out).max(Decimal::ZERO)),
            pending_balance: money(pending),
            paid_out: money(paid_out),
            transactions,
        }
    }

    /// Request a payout of the whole available balance.
    ///
    /// # Errors
    ///
    /// Returns a validation error when nothing is available.
    pub fn request_payout(&self, now: DateTime<Utc>) -> Result<PayoutRequest, ValidationErrors> {
        if self.available_balance.amount <= Decimal::ZERO {
            return Err(ValidationErrors::single(
                Field::PayoutAmount,
                "No available balance for payout",
            ));
        }
        debug!(seller_id = %self.seller_id, amount = %self.available_balance, "Payout requested");
        Ok(PayoutRequest {
            seller_id: self.seller_id,
            amount: self.available_balance,
            requested_at: now,
        })
    }
}

/// A non-commission platform charge, such as a verification fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFee {
    pub kind: EarningKind,
    pub seller_id: SellerId,
    pub amount: Price,
    pub charged_at: DateTime<Utc>,
}

impl PlatformFee {
    /// The one-off seller verification fee.
    #[must_use]
    pub const fn verification(seller_id: SellerId, currency: CurrencyCode, now: DateTime<Utc>) -> Self {
        Self {
            kind: EarningKind::Verification,
            seller_id,
            amount: Price::new(VERIFICATION_FEE, currency),
            charged_at: now,
        }
    }
}

/// Revenue from one source and its share of the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningShare {
    pub kind: EarningKind,
    pub amount: Price,
    /// Percentage of total platform earnings, one decimal place.
    pub percentage: Decimal,
}

/// A seller ranked by gross sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSeller {
    pub seller_id: SellerId,
    pub seller_name: String,
    pub gross_sales: Price,
    pub commission: Price,
    pub order_count: usize,
}

#[derive(Default)]
struct SellerTally {
    name: String,
    sales: Decimal,
    commission: Decimal,
    orders: usize,
}

/// Platform revenue for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEarnings {
    pub total: Price,
    /// One entry per [`EarningKind`], in declaration order.
    pub breakdown: Vec<EarningShare>,
    /// Highest gross sales first.
    pub top_sellers: Vec<TopSeller>,
}

impl PlatformEarnings {
    /// Kinds in the order the breakdown lists them.
    const KINDS: [EarningKind; 4] = [
        EarningKind::Commission,
        EarningKind::Ads,
        EarningKind::Verification,
        EarningKind::ServiceFee,
    ];

    /// Aggregate the commission recorded on each order and the other fees
    /// charged.
    #[must_use]
    pub fn compute(
        orders: &[Order],
        fees: &[PlatformFee],
        currency: CurrencyCode,
        top_n: usize,
    ) -> Self {
        let mut sellers: HashMap<SellerId, SellerTally> = HashMap::new();
        let mut commission = Decimal::ZERO;
        for order in orders.iter().filter(|o| o.status != OrderStatus::Cancelled) {
            commission += order.commission.amount;
            let mut seen = Vec::new();
            for line in &order.lines {
                let tally = sellers.entry(line.seller_id).or_insert_with(|| SellerTally {
                    name: line.seller_name.clone(),
                    ..SellerTally::default()
                });
                tally.sales += line.line_total();
                tally.commission += commission_share(order, line.line_total());
                if !seen.contains(&line.seller_id) {
                    seen.push(line.seller_id);
                    tally.orders += 1;
                }
            }
        }

        let mut amounts: HashMap<EarningKind, Decimal> = HashMap::new();
        amounts.insert(EarningKind::Commission, commission);
        for fee in fees {
            *amounts.entry(fee.kind).or_default() += fee.amount.amount;
        }
        let total: Decimal = amounts.values().copied().sum();

        let breakdown = Self::KINDS
            .iter()
            .map(|&kind| {
                let amount = amounts.get(&kind).copied().unwrap_or_default();
                let percentage = if total.is_zero() {
                    Decimal::ZERO
                } else {
                    (amount / total * Decimal::ONE_HUNDRED).round_dp(1)
                };
                EarningShare {
                    kind,
                    amount: Price::new(round_currency(amount), currency),
                    percentage,
                }
            })
            .collect();

        let mut top_sellers: Vec<TopSeller> = sellers
            .into_iter()
            .map(|(seller_id, tally)| TopSeller {
                seller_id,
                seller_name: tally.name,
                gross_sales: Price::new(round_currency(tally.sales), currency),
                commission: Price::new(round_currency(tally.commission), currency),
                order_count: tally.orders,
            })
            .collect();
        top_sellers.sort_by(|a, b| {
            b.gross_sales
                .amount
                .cmp(&a.gross_sales.amount)
                .then(a.seller_id.cmp(&b.seller_id))
        });
        top_sellers.truncate(top_n);

        Self {
            total: Price::new(round_currency(total), currency),
            breakdown,
            top_sellers,
        }
    }

    /// Amount earned from one source.
    #[must_use]
    pub fn amount_for(&self, kind: EarningKind) -> Option<Price> {
        self.breakdown.iter().find(|s| s.kind == kind).map(|s| s.amount)
    }
}
