//! Shopping cart with add-time price snapshots.

use chrono::{DateTime, Utc};
use common::{CartId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// A line in a cart. `price` is the unit price captured when the line was
/// last added to, not the product's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Money,
}

impl CartItem {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        price: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A user's cart. Created on first add; emptied, not deleted, on checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(user_id: UserId) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of `price * quantity` over all lines.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Adds `item`, merging with an existing line for the same product.
    /// A merged line takes the newer price snapshot.
    pub fn add(&mut self, item: CartItem) {
        match self
            .items
            .iter_mut()
            .find(|i| i.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.price = item.price;
                existing.product_name = item.product_name;
            }
            None => self.items.push(item),
        }
        self.updated_at = Utc::now();
    }

    /// Removes the line for `product_id`. Returns false if there was none.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.updated_at = Utc::now();
        self.items.len() != before
    }

    /// Quantity already in the cart for `product_id`.
    pub fn quantity_of(&self, product_id: ProductId) -> u32 {
        self.items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
            .unwrap_or(0)
    }

    /// True if the cart holds exactly `lines`: the same products with the
    /// same quantities and price snapshots, in any order.
    pub fn has_lines(&self, lines: &[CartItem]) -> bool {
        self.items.len() == lines.len()
            && lines.iter().all(|line| {
                self.items.iter().any(|i| {
                    i.product_id == line.product_id
                        && i.quantity == line.quantity
                        && i.price == line.price
                })
            })
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.updated_at = Utc::now();
    }
}
