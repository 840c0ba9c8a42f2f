//! Storefront services.
//!
//! - `marketplace` - Cart, checkout, and order operations for a session
//! - `earnings` - Buyer, seller, and platform dashboard figures

pub mod earnings;
pub mod marketplace;

pub use earnings::{
    BuyerOrderStats, EarningShare, PayoutLedger, PayoutRequest, PlatformEarnings, PlatformFee,
    SellerEarnings, SellerTransaction, TopSeller, VERIFICATION_FEE,
};
pub use marketplace::Marketplace;
