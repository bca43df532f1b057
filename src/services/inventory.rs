use crate::{
    alerts::{AlertJob, AlertQueue},
    entities::{product, stock_alert, stock_movement, MovementKind},
    errors::ServiceError,
    services::stock_adjustment::StockAdjustmentEngine,
    store::{AlertFilter, NewProduct, ProductChanges, StockStore},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

/// Threshold applied when a product is created without one
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;

/// Largest page a list call will return
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "SKU must be 1-100 characters"))]
    pub sku: String,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "Initial stock cannot be negative"))]
    pub stock: i32,
    #[serde(default, alias = "low_stock_at")]
    #[validate(range(min = 1, message = "Threshold must be at least 1"))]
    pub low_stock_threshold: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000, message = "Description cannot exceed 2000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[serde(default, alias = "low_stock_at")]
    #[validate(range(min = 1, message = "Threshold must be at least 1"))]
    pub low_stock_threshold: Option<i32>,
}

impl From<UpdateProductInput> for ProductChanges {
    fn from(input: UpdateProductInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
            price: input.price,
            low_stock_threshold: input.low_stock_threshold,
        }
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price > Decimal::ZERO {
        Ok(())
    } else {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must be greater than zero".into());
        Err(err)
    }
}

/// One page of products
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Product catalogue and stock operations.
///
/// Stock changes are delegated to the [`StockAdjustmentEngine`]; low-stock
/// alerts are handed to the alert queue only after the change committed.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn StockStore>,
    engine: StockAdjustmentEngine,
    alerts: AlertQueue,
    default_threshold: i32,
}

impl InventoryService {
    pub fn new(store: Arc<dyn StockStore>, alerts: AlertQueue) -> Self {
        Self {
            engine: StockAdjustmentEngine::new(Arc::clone(&store)),
            store,
            alerts,
            default_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    pub fn with_default_threshold(mut self, threshold: i32) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn default_threshold(&self) -> i32 {
        self.default_threshold
    }

    /// Creates a product; the threshold falls back to the configured default
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let product = self
            .store
            .create_product(NewProduct {
                name: input.name,
                sku: input.sku,
                description: input.description,
                price: input.price,
                stock: input.stock,
                low_stock_threshold: input
                    .low_stock_threshold
                    .unwrap_or(self.default_threshold),
            })
            .await?;

        info!(product_id = product.id, "product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i32) -> Result<product::Model, ServiceError> {
        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self, page: u64, per_page: u64) -> Result<ProductPage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::InvalidInput("page must be at least 1".into()));
        }
        if per_page == 0 || per_page > MAX_PAGE_SIZE {
            return Err(ServiceError::InvalidInput(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let (items, total) = self.store.list_products(page, per_page).await?;
        Ok(ProductPage {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Updates descriptive fields and the threshold; stock is never touched here
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: i32,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        self.store
            .update_product(id, input.into())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self, reason))]
    pub async fn add_stock(
        &self,
        id: i32,
        quantity: i32,
        reason: &str,
    ) -> Result<product::Model, ServiceError> {
        validate_adjustment(quantity, reason)?;
        self.engine
            .adjust_stock(id, quantity, MovementKind::Add, reason.trim())
            .await
    }

    /// Deducts stock and, once committed, queues a low-stock alert when the
    /// remaining stock is at or below the product threshold.
    #[instrument(skip(self, reason))]
    pub async fn deduct_stock(
        &self,
        id: i32,
        quantity: i32,
        reason: &str,
    ) -> Result<product::Model, ServiceError> {
        validate_adjustment(quantity, reason)?;
        let product = self
            .engine
            .adjust_stock(id, -quantity, MovementKind::Deduct, reason.trim())
            .await?;

        if product.is_low_stock() {
            // The adjustment is already committed; a closed queue only costs
            // the alert.
            if let Err(err) = self.alerts.enqueue(AlertJob::for_product(&product)).await {
                warn!(
                    product_id = product.id,
                    stock = product.stock,
                    error = %err,
                    "low-stock alert not queued"
                );
            }
        }

        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn stock_history(
        &self,
        product_id: i32,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        self.get_product(product_id).await?;
        self.store.stock_history(product_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_alerts(
        &self,
        product_id: Option<i32>,
        unresolved_only: bool,
    ) -> Result<Vec<stock_alert::Model>, ServiceError> {
        self.store
            .list_alerts(AlertFilter {
                product_id,
                unresolved_only,
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn resolve_alert(&self, alert_id: i32) -> Result<stock_alert::Model, ServiceError> {
        self.store
            .resolve_alert(alert_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Alert {} not found", alert_id)))
    }

    /// Verifies the store answers
    pub async fn check_store(&self) -> Result<(), ServiceError> {
        self.store.ping().await
    }
}

fn validate_adjustment(quantity: i32, reason: &str) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be greater than zero".into(),
        ));
    }
    if reason.trim().is_empty() {
        return Err(ServiceError::ValidationError("reason is required".into()));
    }
    Ok(())
}
