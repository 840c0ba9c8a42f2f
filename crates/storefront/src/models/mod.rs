//! Domain models for the storefront.
//!
//! Products are read-only inputs owned by the catalog; users are the
//! identities an [`AuthSession`](crate::session::AuthSession) holds.

pub mod product;
pub mod session;
pub mod user;

pub use product::Product;
pub use user::User;
