use super::{
    AlertFilter, AlertSink, NewAlert, NewMovement, NewProduct, ProductChanges, StockStore,
    StockUnit,
};
use crate::entities::{product, stock_alert, stock_movement};
use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
    TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// sea-orm backed store. Works against Postgres (row locks via
/// `SELECT ... FOR UPDATE`) and SQLite, where a unit takes the database
/// write lock before its first read and competing units wait in the busy
/// handler.
#[derive(Clone)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
    lock_timeout: Option<Duration>,
}

impl DatabaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            lock_timeout: None,
        }
    }

    /// Bounds how long a unit waits for a product row lock on Postgres.
    /// SQLite waits are bounded by the connection busy timeout, see
    /// [`crate::db::DbConfig::lock_timeout`].
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl StockStore for DatabaseStore {
    async fn begin(&self) -> Result<Box<dyn StockUnit>, ServiceError> {
        let backend = self.db.get_database_backend();
        let txn = self.db.begin().await.map_err(ServiceError::from_db)?;

        if let (DbBackend::Postgres, Some(timeout)) = (backend, self.lock_timeout) {
            txn.execute_unprepared(&format!(
                "SET LOCAL lock_timeout = '{}ms'",
                timeout.as_millis()
            ))
            .await
            .map_err(ServiceError::from_db)?;
        }

        Ok(Box::new(DatabaseUnit { txn, backend }))
    }

    async fn create_product(&self, new: NewProduct) -> Result<product::Model, ServiceError> {
        let now = Utc::now();
        let model = product::ActiveModel {
            name: Set(new.name),
            sku: Set(new.sku),
            description: Set(new.description),
            price: Set(new.price),
            stock: Set(new.stock),
            low_stock_threshold: Set(new.low_stock_threshold),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::from_db)
    }

    async fn find_product(&self, id: i32) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::from_db)
    }

    async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .order_by_asc(product::Column::Id)
            .paginate(self.db.as_ref(), per_page);

        let total = paginator.num_items().await.map_err(ServiceError::from_db)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::from_db)?;

        Ok((items, total))
    }

    async fn update_product(
        &self,
        id: i32,
        changes: ProductChanges,
    ) -> Result<Option<product::Model>, ServiceError> {
        let db = self.db.as_ref();
        let Some(existing) = product::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::from_db)?
        else {
            return Ok(None);
        };

        if changes.is_empty() {
            return Ok(Some(existing));
        }

        // Only the touched columns are written so concurrent stock
        // adjustments are never overwritten.
        let mut model = product::ActiveModel {
            id: Set(existing.id),
            ..Default::default()
        };
        if let Some(name) = changes.name {
            model.name = Set(name);
        }
        if let Some(description) = changes.description {
            model.description = Set(Some(description));
        }
        if let Some(price) = changes.price {
            model.price = Set(price);
        }
        if let Some(threshold) = changes.low_stock_threshold {
            model.low_stock_threshold = Set(threshold);
        }

        let updated = model.update(db).await.map_err(ServiceError::from_db)?;
        Ok(Some(updated))
    }

    async fn stock_history(
        &self,
        product_id: i32,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::from_db)
    }

    async fn list_alerts(
        &self,
        filter: AlertFilter,
    ) -> Result<Vec<stock_alert::Model>, ServiceError> {
        let mut query = stock_alert::Entity::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_alert::Column::ProductId.eq(product_id));
        }
        if filter.unresolved_only {
            query = query.filter(stock_alert::Column::Resolved.eq(false));
        }

        query
            .order_by_asc(stock_alert::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::from_db)
    }

    async fn resolve_alert(&self, id: i32) -> Result<Option<stock_alert::Model>, ServiceError> {
        let db = self.db.as_ref();
        let Some(alert) = stock_alert::Entity::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::from_db)?
        else {
            return Ok(None);
        };

        if alert.resolved {
            return Ok(Some(alert));
        }

        let mut model: stock_alert::ActiveModel = alert.into();
        model.resolved = Set(true);
        let updated = model.update(db).await.map_err(ServiceError::from_db)?;
        Ok(Some(updated))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        self.db.ping().await.map_err(ServiceError::from_db)
    }
}

#[async_trait]
impl AlertSink for DatabaseStore {
    async fn persist_alert(&self, alert: NewAlert) -> Result<stock_alert::Model, ServiceError> {
        let model = stock_alert::ActiveModel {
            product_id: Set(alert.product_id),
            stock: Set(alert.stock),
            threshold: Set(alert.threshold),
            resolved: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::from_db)
    }
}

/// Atomic unit backed by one database transaction. The transaction rolls
/// back when dropped uncommitted.
struct DatabaseUnit {
    txn: DatabaseTransaction,
    backend: DbBackend,
}

impl DatabaseUnit {
    /// No-op write that moves this SQLite transaction to the write lock
    /// before anything is read. A deferred transaction that reads first and
    /// writes later cannot wait for the lock; SQLite fails it as a deadlock.
    async fn claim_sqlite_write_lock(&self, product_id: i32) -> Result<(), ServiceError> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Sqlite,
            "UPDATE products SET stock = stock WHERE id = ?",
            [product_id.into()],
        );
        self.txn.execute(stmt).await.map_err(ServiceError::from_db)?;
        Ok(())
    }
}

#[async_trait]
impl StockUnit for DatabaseUnit {
    async fn read_for_update(
        &mut self,
        product_id: i32,
    ) -> Result<Option<product::Model>, ServiceError> {
        let mut query = product::Entity::find_by_id(product_id);
        match self.backend {
            DbBackend::Postgres | DbBackend::MySql => query = query.lock_exclusive(),
            DbBackend::Sqlite => self.claim_sqlite_write_lock(product_id).await?,
        }

        query.one(&self.txn).await.map_err(ServiceError::from_db)
    }

    async fn update(&mut self, row: &product::Model) -> Result<product::Model, ServiceError> {
        let model = product::ActiveModel {
            id: Set(row.id),
            stock: Set(row.stock),
            ..Default::default()
        };

        model.update(&self.txn).await.map_err(ServiceError::from_db)
    }

    async fn append_movement(
        &mut self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let model = stock_movement::ActiveModel {
            product_id: Set(movement.product_id),
            movement_type: Set(movement.kind),
            quantity: Set(movement.quantity),
            stock_after: Set(movement.stock_after),
            reason: Set(movement.reason),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model.insert(&self.txn).await.map_err(ServiceError::from_db)
    }

    async fn commit(self: Box<Self>) -> Result<(), ServiceError> {
        self.txn.commit().await.map_err(|e| {
            warn!(error = %e, "stock unit commit failed");
            ServiceError::from_db(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), ServiceError> {
        debug!("rolling back stock unit");
        self.txn.rollback().await.map_err(ServiceError::from_db)
    }
}
