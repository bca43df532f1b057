//! Durable storage for products, the movement ledger and alerts.
//!
//! Stock mutations go through a [`StockUnit`]: an atomic unit that holds an
//! exclusive lock on every product row it reads for update until it is
//! committed or rolled back. Dropping a unit without committing discards
//! its writes.

pub mod database;
pub mod in_memory;

pub use database::DatabaseStore;
pub use in_memory::InMemoryStore;

use crate::entities::{product, stock_alert, stock_movement, MovementKind};
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Values for a product insert
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
    pub low_stock_threshold: i32,
}

/// Non-stock product fields to overwrite; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub low_stock_threshold: Option<i32>,
}

impl ProductChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.low_stock_threshold.is_none()
    }

    pub(crate) fn apply_to(self, row: &mut product::Model) {
        if let Some(name) = self.name {
            row.name = name;
        }
        if let Some(description) = self.description {
            row.description = Some(description);
        }
        if let Some(price) = self.price {
            row.price = price;
        }
        if let Some(threshold) = self.low_stock_threshold {
            row.low_stock_threshold = threshold;
        }
    }
}

/// Ledger entry to append inside a unit
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: i32,
    pub kind: MovementKind,
    pub quantity: i32,
    pub stock_after: i32,
    pub reason: String,
}

/// Alert record written by the pipeline workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub product_id: i32,
    pub stock: i32,
    pub threshold: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertFilter {
    pub product_id: Option<i32>,
    pub unresolved_only: bool,
}

impl AlertFilter {
    pub(crate) fn matches(&self, alert: &stock_alert::Model) -> bool {
        self.product_id.map_or(true, |id| alert.product_id == id)
            && !(self.unresolved_only && alert.resolved)
    }
}

/// Storage operations used by the inventory service.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Opens a new atomic unit.
    async fn begin(&self) -> Result<Box<dyn StockUnit>, ServiceError>;

    async fn create_product(&self, new: NewProduct) -> Result<product::Model, ServiceError>;

    async fn find_product(&self, id: i32) -> Result<Option<product::Model>, ServiceError>;

    /// Returns one page (1-based) plus the total number of products.
    async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError>;

    /// Overwrites non-stock fields. Returns `None` when the product is absent.
    async fn update_product(
        &self,
        id: i32,
        changes: ProductChanges,
    ) -> Result<Option<product::Model>, ServiceError>;

    /// All movements of a product ordered by id.
    async fn stock_history(
        &self,
        product_id: i32,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>;

    async fn list_alerts(
        &self,
        filter: AlertFilter,
    ) -> Result<Vec<stock_alert::Model>, ServiceError>;

    /// Marks an alert resolved. Returns `None` when the alert is absent.
    async fn resolve_alert(&self, id: i32) -> Result<Option<stock_alert::Model>, ServiceError>;

    async fn ping(&self) -> Result<(), ServiceError>;
}

/// One atomic unit of stock mutation.
#[async_trait]
pub trait StockUnit: Send {
    /// Reads a product row and holds an exclusive lock on it until the unit ends.
    async fn read_for_update(
        &mut self,
        product_id: i32,
    ) -> Result<Option<product::Model>, ServiceError>;

    /// Writes back the stock of a row previously read for update.
    async fn update(&mut self, row: &product::Model) -> Result<product::Model, ServiceError>;

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError>;

    async fn commit(self: Box<Self>) -> Result<(), ServiceError>;

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError>;
}

/// Destination for low-stock alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn persist_alert(&self, alert: NewAlert) -> Result<stock_alert::Model, ServiceError>;
}
