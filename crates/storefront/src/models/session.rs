//! Keys used in the durable session store.

/// Session keys for persisted state.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for storing the cart contents.
    pub const CART: &str = "cart";
}
