//! Bazaar storefront engine.
//!
//! Cart, pricing, checkout validation, order lifecycle, and session handling
//! for the Bazaar marketplace. The remote marketplace API is reached through
//! the [`MarketplaceBackend`] port; [`HttpBackend`] is its REST client.
//!
//! ```rust,ignore
//! let config = StorefrontConfig::from_env()?;
//! let _telemetry = telemetry::init(&config);
//!
//! let backend = HttpBackend::from_config(&config)?;
//! let mut market = Marketplace::new(backend, SimulatedGateway::default(), &config);
//! let mut session = AuthSession::restore(FileStore::open(&config.session_path)?)?;
//!
//! market.login(&mut session, user)?;
//! market.add_to_cart(&mut session, &product, 2).await?;
//! let order = market.place_order(&mut session, &form).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod cart;
pub mod config;
pub mod error;
pub mod models;
pub mod orders;
pub mod pricing;
pub mod services;
pub mod session;
pub mod telemetry;

pub use backend::{BackendError, HttpBackend, MarketplaceBackend, PaymentGateway, SimulatedGateway};
pub use cart::{CartError, CartLine, CartStore};
pub use config::StorefrontConfig;
pub use error::{Result, StorefrontError};
pub use models::{Product, User};
pub use orders::{CheckoutForm, Order, OrderAction, OrderBook};
pub use pricing::{FeeSchedule, PriceBreakdown};
pub use services::Marketplace;
pub use session::{AuthSession, FileStore, MemoryStore, SessionStore};
