//! User identity held by the session.

use serde::{Deserialize, Serialize};

use bazaar_core::{Role, SellerId, UserId};

/// A signed-in marketplace user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Role that gates what the user may do.
    pub role: Role,
    /// Seller account linked to this user, for sellers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<SellerId>,
    /// Default shipping address used to prefill checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl User {
    /// Create a buyer.
    #[must_use]
    pub fn buyer(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::Buyer,
            seller_id: None,
            address: None,
        }
    }

    /// Create a seller linked to a seller account.
    #[must_use]
    pub fn seller(
        id: UserId,
        seller_id: SellerId,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::Seller,
            seller_id: Some(seller_id),
            address: None,
        }
    }

    /// Create an admin.
    #[must_use]
    pub fn admin(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: Role::Admin,
            seller_id: None,
            address: None,
        }
    }
}
