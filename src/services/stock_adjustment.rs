use crate::{
    entities::{product, MovementKind},
    errors::ServiceError,
    store::{NewMovement, StockStore, StockUnit},
};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Applies signed stock changes to one product at a time.
///
/// Each adjustment runs in its own atomic unit: the product row is locked,
/// the new stock is checked and written, and exactly one movement is
/// appended. Adjustments to different products never share a lock.
#[derive(Clone)]
pub struct StockAdjustmentEngine {
    store: Arc<dyn StockStore>,
}

impl StockAdjustmentEngine {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    /// Adds `delta` to the product's stock and records the movement.
    ///
    /// Fails with `InsufficientStock` when the result would be negative, in
    /// which case neither the row nor the ledger changes.
    #[instrument(skip(self, reason))]
    pub async fn adjust_stock(
        &self,
        product_id: i32,
        delta: i32,
        kind: MovementKind,
        reason: &str,
    ) -> Result<product::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::InvalidInput(
                "stock adjustment must be non-zero".to_string(),
            ));
        }
        if !kind.accepts(delta) {
            return Err(ServiceError::InvalidInput(format!(
                "delta {} does not match movement kind '{}'",
                delta,
                kind.as_str()
            )));
        }
        let quantity = delta.checked_abs().ok_or_else(|| {
            ServiceError::InvalidInput(format!("delta {} is out of range", delta))
        })?;

        let start = Instant::now();
        let mut unit = self.store.begin().await?;

        match Self::apply(unit.as_mut(), product_id, delta, quantity, kind, reason).await {
            Ok(updated) => {
                unit.commit().await?;

                counter!("inventory.adjustments.committed", 1, "kind" => kind.as_str());
                histogram!("inventory.adjustments.duration", start.elapsed());
                info!(
                    product_id,
                    delta,
                    stock = updated.stock,
                    "stock adjustment committed"
                );
                Ok(updated)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(product_id, error = %rollback_err, "rollback after failed adjustment failed");
                }

                counter!("inventory.adjustments.rejected", 1, "kind" => kind.as_str());
                debug!(product_id, delta, error = %err, "stock adjustment rejected");
                Err(err)
            }
        }
    }

    async fn apply(
        unit: &mut dyn StockUnit,
        product_id: i32,
        delta: i32,
        quantity: i32,
        kind: MovementKind,
        reason: &str,
    ) -> Result<product::Model, ServiceError> {
        let mut row = unit
            .read_for_update(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let new_stock = row.stock.checked_add(delta).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "adjusting stock {} by {} overflows",
                row.stock, delta
            ))
        })?;

        if new_stock < 0 {
            return Err(ServiceError::InsufficientStock {
                product_id,
                available: row.stock,
                requested: quantity,
            });
        }

        row.stock = new_stock;
        let updated = unit.update(&row).await?;

        unit.append_movement(NewMovement {
            product_id,
            kind,
            quantity,
            stock_after: updated.stock,
            reason: reason.to_string(),
        })
        .await?;

        Ok(updated)
    }
}
