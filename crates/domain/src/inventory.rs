//! Per-product stock records and adjustment rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Low-stock threshold applied when none is configured.
pub const DEFAULT_LOW_STOCK: u32 = 5;

/// Stock record for a single product.
///
/// `stock` is unsigned, so a record can never hold a negative count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub product_id: ProductId,
    /// Product name, joined in for alerts and admin listings.
    pub product_name: String,
    pub stock: u32,
    pub low_stock: u32,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    pub fn new(product_id: ProductId, product_name: impl Into<String>, stock: u32) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            stock,
            low_stock: DEFAULT_LOW_STOCK,
            updated_at: Utc::now(),
        }
    }

    /// True when stock is at or below the alert threshold.
    pub fn is_low(&self) -> bool {
        self.stock <= self.low_stock
    }

    /// Removes `quantity` units, failing without change if there are not enough.
    pub fn deduct(&mut self, quantity: u32) -> Result<(), InventoryError> {
        if quantity > self.stock {
            return Err(InventoryError::InsufficientStock {
                product_id: self.product_id,
                requested: quantity,
                available: self.stock,
            });
        }
        self.stock -= quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn restock(&mut self, quantity: u32) {
        self.stock = self.stock.saturating_add(quantity);
        self.updated_at = Utc::now();
    }

    /// Applies an admin adjustment. Decrements clamp at zero.
    pub fn adjust(&mut self, adjustment: StockAdjustment) {
        self.stock = adjustment.apply_to(self.stock);
        self.updated_at = Utc::now();
    }
}

/// Admin stock operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustOp {
    Set,
    Increment,
    Decrement,
}

impl AdjustOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustOp::Set => "set",
            AdjustOp::Increment => "increment",
            AdjustOp::Decrement => "decrement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub op: AdjustOp,
    pub value: u32,
}

impl StockAdjustment {
    pub fn new(op: AdjustOp, value: u32) -> Self {
        Self { op, value }
    }

    /// Resulting stock when applied to `current`.
    pub fn apply_to(&self, current: u32) -> u32 {
        match self.op {
            AdjustOp::Set => self.value,
            AdjustOp::Increment => current.saturating_add(self.value),
            AdjustOp::Decrement => current.saturating_sub(self.value),
        }
    }
}

/// A quantity of one product to deduct or restock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Merges lines for the same product and validates quantities.
///
/// The result is ordered by product id, which gives every writer the same
/// lock order when the lines are applied row by row.
pub fn normalize_lines(lines: &[StockLine]) -> Result<Vec<StockLine>, InventoryError> {
    let mut merged: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(InventoryError::InvalidQuantity {
                product_id: line.product_id,
            });
        }
        let entry = merged.entry(line.product_id).or_insert(0);
        *entry = entry.saturating_add(line.quantity);
    }
    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| StockLine::new(product_id, quantity))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Quantity for product {product_id} must be greater than 0")]
    InvalidQuantity { product_id: ProductId },
}
