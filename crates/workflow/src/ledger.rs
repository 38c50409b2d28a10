//! Inventory ledger: stock deduction, restocking and low-stock alerts.

use std::sync::{Arc, Mutex, PoisonError};

use common::ProductId;
use domain::{Inventory, Money, Product, StockAdjustment, StockLine, DEFAULT_LOW_STOCK};
use store::CommerceStore;
use tokio::task::JoinHandle;

use crate::error::{Result, WorkflowError};
use crate::services::{Collaborators, Email, Mailer};

/// Input for registering a product with its opening stock.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub stock: u32,
    pub low_stock: Option<u32>,
}

/// Owns every stock mutation. All multi-line operations are atomic in the store.
pub struct InventoryLedger<S> {
    store: S,
    mailer: Arc<dyn Mailer>,
    admin_email: String,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S> InventoryLedger<S>
where
    S: CommerceStore,
{
    pub fn new(store: S, collaborators: &Collaborators) -> Self {
        Self {
            store,
            mailer: collaborators.mailer.clone(),
            admin_email: collaborators.admin_email.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Creates a product and its inventory record together.
    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn register_product(&self, new: NewProduct) -> Result<(Product, Inventory)> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(WorkflowError::Validation("Product name is required".to_string()));
        }
        if !Product::is_valid_price(new.price)
            || new.sale_price.is_some_and(|p| !Product::is_valid_price(p))
        {
            return Err(WorkflowError::Validation(format!(
                "Price must be between 0 and {}",
                Product::MAX_PRICE
            )));
        }

        let mut product = Product::new(name, new.price);
        product.sale_price = new.sale_price;
        let inventory = self
            .store
            .insert_product(
                product.clone(),
                new.stock,
                new.low_stock.unwrap_or(DEFAULT_LOW_STOCK),
            )
            .await?;
        tracing::info!(product_id = %product.id, stock = inventory.stock, "product registered");
        Ok((product, inventory))
    }

    pub async fn get(&self, product_id: ProductId) -> Result<Inventory> {
        self.store
            .get_inventory(product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("inventory", product_id))
    }

    /// Deducts every line or none, then alerts on low stock.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn deduct(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        let inventories = self.store.deduct_stock(lines).await?;
        self.alert_low_stock(&inventories);
        Ok(inventories)
    }

    /// Adds `quantity` units back to one product.
    pub async fn restock(&self, product_id: ProductId, quantity: u32) -> Result<Inventory> {
        let mut inventories = self
            .restock_lines(&[StockLine::new(product_id, quantity)])
            .await?;
        inventories
            .pop()
            .ok_or_else(|| WorkflowError::not_found("inventory", product_id))
    }

    /// Restocks several products atomically.
    pub async fn restock_lines(&self, lines: &[StockLine]) -> Result<Vec<Inventory>> {
        Ok(self.store.restock(lines).await?)
    }

    /// Applies an admin adjustment; decrements clamp at zero.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(
        &self,
        product_id: ProductId,
        adjustment: StockAdjustment,
    ) -> Result<Inventory> {
        let inventory = self.store.adjust_stock(product_id, adjustment).await?;
        self.alert_low_stock(std::slice::from_ref(&inventory));
        Ok(inventory)
    }

    pub async fn set_threshold(&self, product_id: ProductId, threshold: u32) -> Result<Inventory> {
        Ok(self
            .store
            .set_low_stock_threshold(product_id, threshold)
            .await?)
    }

    pub async fn list_low_stock(&self) -> Result<Vec<Inventory>> {
        Ok(self.store.list_low_stock().await?)
    }

    /// Emails the admin in the background for every inventory at or below
    /// its threshold. Failures are logged and never propagated.
    pub fn alert_low_stock(&self, inventories: &[Inventory]) {
        for inventory in inventories.iter().filter(|i| i.is_low()) {
            let email = Email::new(
                self.admin_email.clone(),
                format!("Low stock: {}", inventory.product_name),
                format!(
                    "Product \"{}\" is running low.\n\nRemaining stock: {}\nLow stock threshold: {}\n",
                    inventory.product_name, inventory.stock, inventory.low_stock
                ),
            );
            metrics::counter!("low_stock_alerts_total").increment(1);
            tracing::warn!(
                product_id = %inventory.product_id,
                stock = inventory.stock,
                threshold = inventory.low_stock,
                "low stock"
            );

            let mailer = self.mailer.clone();
            let product_id = inventory.product_id;
            let handle = tokio::spawn(async move {
                if !mailer.send(email).await {
                    tracing::error!(%product_id, "low stock alert failed");
                }
            });

            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.retain(|h| !h.is_finished());
            pending.push(handle);
        }
    }

    /// Waits for every alert scheduled so far.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "low stock alert task panicked");
            }
        }
    }
}
