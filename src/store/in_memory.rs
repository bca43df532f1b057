use super::{
    AlertFilter, AlertSink, NewAlert, NewMovement, NewProduct, ProductChanges, StockStore,
    StockUnit,
};
use crate::entities::{product, stock_alert, stock_movement};
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Process-local store with one async mutex per product row.
///
/// Committed rows are plain snapshots readable without touching the row
/// locks. A unit stages its writes and publishes them on commit while it
/// still holds every lock it acquired.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    products: DashMap<i32, product::Model>,
    row_locks: DashMap<i32, Arc<Mutex<()>>>,
    skus: DashMap<String, i32>,
    movements: DashMap<i32, Vec<stock_movement::Model>>,
    alerts: DashMap<i32, stock_alert::Model>,
    product_ids: AtomicI32,
    movement_ids: AtomicI32,
    alert_ids: AtomicI32,
    lock_timeout: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails row-lock waits longer than `timeout` with a transient error.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                lock_timeout: Some(timeout),
                ..Default::default()
            }),
        }
    }

    /// Number of committed movements for a product
    pub fn movement_count(&self, product_id: i32) -> usize {
        self.inner
            .movements
            .get(&product_id)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

impl Inner {
    fn row_lock(&self, product_id: i32) -> Option<Arc<Mutex<()>>> {
        self.row_locks.get(&product_id).map(|lock| lock.clone())
    }

    async fn lock_row(&self, product_id: i32) -> Result<Option<OwnedMutexGuard<()>>, ServiceError> {
        let Some(lock) = self.row_lock(product_id) else {
            return Ok(None);
        };

        let guard = match self.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    ServiceError::TransientStore(format!(
                        "timed out after {:?} waiting for product {} row lock",
                        timeout, product_id
                    ))
                })?,
            None => lock.lock_owned().await,
        };

        Ok(Some(guard))
    }

    fn snapshot(&self, product_id: i32) -> Option<product::Model> {
        self.products.get(&product_id).map(|row| row.clone())
    }
}

#[async_trait]
impl StockStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StockUnit>, ServiceError> {
        Ok(Box::new(InMemoryUnit {
            inner: Arc::clone(&self.inner),
            guards: HashMap::new(),
            staged_rows: HashMap::new(),
            staged_movements: Vec::new(),
        }))
    }

    async fn create_product(&self, new: NewProduct) -> Result<product::Model, ServiceError> {
        if new.stock < 0 {
            return Err(ServiceError::InvalidInput(
                "stock cannot be negative".to_string(),
            ));
        }

        let id = match self.inner.skus.entry(new.sku.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!(
                    "product with SKU '{}' already exists",
                    new.sku
                )))
            }
            Entry::Vacant(slot) => {
                let id = self.inner.product_ids.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(id);
                id
            }
        };

        let now = Utc::now();
        let row = product::Model {
            id,
            name: new.name,
            sku: new.sku,
            description: new.description,
            price: new.price,
            stock: new.stock,
            low_stock_threshold: new.low_stock_threshold,
            created_at: now,
            updated_at: now,
        };

        self.inner.row_locks.insert(id, Arc::new(Mutex::new(())));
        self.inner.products.insert(id, row.clone());
        Ok(row)
    }

    async fn find_product(&self, id: i32) -> Result<Option<product::Model>, ServiceError> {
        Ok(self.inner.snapshot(id))
    }

    async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut rows: Vec<product::Model> = self
            .inner
            .products
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);

        let total = rows.len() as u64;
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        let items = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .collect();

        Ok((items, total))
    }

    async fn update_product(
        &self,
        id: i32,
        changes: ProductChanges,
    ) -> Result<Option<product::Model>, ServiceError> {
        // Serialise with stock adjustments so a commit never overwrites
        // these fields with a stale snapshot.
        let Some(_guard) = self.inner.lock_row(id).await? else {
            return Ok(None);
        };

        let Some(mut row) = self.inner.products.get_mut(&id) else {
            return Ok(None);
        };
        if !changes.is_empty() {
            changes.apply_to(&mut row);
            row.updated_at = Utc::now();
        }
        Ok(Some(row.clone()))
    }

    async fn stock_history(
        &self,
        product_id: i32,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let mut history = self
            .inner
            .movements
            .get(&product_id)
            .map(|entries| entries.clone())
            .unwrap_or_default();
        history.sort_by_key(|movement| movement.id);
        Ok(history)
    }

    async fn list_alerts(
        &self,
        filter: AlertFilter,
    ) -> Result<Vec<stock_alert::Model>, ServiceError> {
        let mut alerts: Vec<stock_alert::Model> = self
            .inner
            .alerts
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by_key(|alert| alert.id);
        Ok(alerts)
    }

    async fn resolve_alert(&self, id: i32) -> Result<Option<stock_alert::Model>, ServiceError> {
        Ok(self.inner.alerts.get_mut(&id).map(|mut alert| {
            alert.resolved = true;
            alert.clone()
        }))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for InMemoryStore {
    async fn persist_alert(&self, alert: NewAlert) -> Result<stock_alert::Model, ServiceError> {
        if !self.inner.products.contains_key(&alert.product_id) {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                alert.product_id
            )));
        }

        let id = self.inner.alert_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let record = stock_alert::Model {
            id,
            product_id: alert.product_id,
            stock: alert.stock,
            threshold: alert.threshold,
            resolved: false,
            created_at: Utc::now(),
        };
        self.inner.alerts.insert(id, record.clone());
        Ok(record)
    }
}

struct InMemoryUnit {
    inner: Arc<Inner>,
    guards: HashMap<i32, OwnedMutexGuard<()>>,
    staged_rows: HashMap<i32, product::Model>,
    staged_movements: Vec<stock_movement::Model>,
}

impl InMemoryUnit {
    fn ensure_locked(&self, product_id: i32) -> Result<(), ServiceError> {
        if self.guards.contains_key(&product_id) {
            Ok(())
        } else {
            Err(ServiceError::InternalError(format!(
                "product {} was not read for update in this unit",
                product_id
            )))
        }
    }
}

#[async_trait]
impl StockUnit for InMemoryUnit {
    async fn read_for_update(
        &mut self,
        product_id: i32,
    ) -> Result<Option<product::Model>, ServiceError> {
        if self.guards.contains_key(&product_id) {
            return Ok(self
                .staged_rows
                .get(&product_id)
                .cloned()
                .or_else(|| self.inner.snapshot(product_id)));
        }

        let Some(guard) = self.inner.lock_row(product_id).await? else {
            return Ok(None);
        };
        self.guards.insert(product_id, guard);

        // Read after the lock is held so the snapshot includes every
        // earlier commit.
        Ok(self.inner.snapshot(product_id))
    }

    async fn update(&mut self, row: &product::Model) -> Result<product::Model, ServiceError> {
        self.ensure_locked(row.id)?;
        if row.stock < 0 {
            return Err(ServiceError::InvalidInput(format!(
                "stock for product {} cannot be negative",
                row.id
            )));
        }

        let mut staged = self
            .staged_rows
            .get(&row.id)
            .cloned()
            .or_else(|| self.inner.snapshot(row.id))
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", row.id)))?;
        staged.stock = row.stock;
        staged.updated_at = Utc::now();

        self.staged_rows.insert(row.id, staged.clone());
        Ok(staged)
    }

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        self.ensure_locked(movement.product_id)?;

        let record = stock_movement::Model {
            id: self.inner.movement_ids.fetch_add(1, Ordering::SeqCst) + 1,
            product_id: movement.product_id,
            movement_type: movement.kind,
            quantity: movement.quantity,
            stock_after: movement.stock_after,
            reason: movement.reason,
            created_at: Utc::now(),
        };
        self.staged_movements.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        let InMemoryUnit {
            inner,
            guards,
            staged_rows,
            staged_movements,
        } = *self;

        for (id, row) in staged_rows {
            inner.products.insert(id, row);
        }
        for movement in staged_movements {
            inner
                .movements
                .entry(movement.product_id)
                .or_default()
                .push(movement);
        }

        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        debug!(
            staged_rows = self.staged_rows.len(),
            staged_movements = self.staged_movements.len(),
            "discarding in-memory stock unit"
        );
        Ok(())
    }
}
