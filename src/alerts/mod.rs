//! Asynchronous low-stock alerting.
//!
//! The inventory service submits an [`AlertJob`] after a deduct commits
//! with stock at or below the product threshold; the [`AlertPipeline`]
//! workers persist the jobs as alert records.

pub mod pipeline;

pub use pipeline::{AlertPipeline, AlertQueue, PipelineConfig, PipelineState, PipelineStats};

use crate::entities::product;
use crate::store::NewAlert;
use serde::Serialize;

/// Snapshot of a product at the moment it crossed its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertJob {
    pub product_id: i32,
    pub stock: i32,
    pub threshold: i32,
}

impl AlertJob {
    pub fn for_product(product: &product::Model) -> Self {
        Self {
            product_id: product.id,
            stock: product.stock,
            threshold: product.low_stock_threshold,
        }
    }

    pub(crate) fn to_new_alert(&self) -> NewAlert {
        NewAlert {
            product_id: self.product_id,
            stock: self.stock,
            threshold: self.threshold,
        }
    }
}
