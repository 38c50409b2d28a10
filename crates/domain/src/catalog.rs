//! Catalog and account records the core reads but does not manage.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A sellable product. Every product owns exactly one inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Highest accepted unit price: 10 million in major units.
    pub const MAX_PRICE: Money = Money::from_cents(1_000_000_000);

    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            sale_price: None,
            created_at: Utc::now(),
        }
    }

    /// True if `price` is a valid unit price: non-negative and at most
    /// [`Product::MAX_PRICE`].
    pub fn is_valid_price(price: Money) -> bool {
        !price.is_negative() && price <= Self::MAX_PRICE
    }

    /// The unit price a new cart line snapshots.
    pub fn current_price(&self) -> Money {
        self.sale_price.unwrap_or(self.price)
    }
}

/// Role carried by an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Account record used for notification email lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

impl User {
    pub fn new(name: impl Into<String>, email: Option<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email,
            role,
        }
    }
}
