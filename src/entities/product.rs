use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};

/// Product entity. `stock` is only ever written by the stock adjustment
/// engine; every other path treats it as read-only.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Product name
    pub name: String,

    /// SKU (Stock Keeping Unit), unique across products
    #[sea_orm(unique)]
    pub sku: String,

    /// Product description
    pub description: Option<String>,

    /// Unit price
    pub price: Decimal,

    /// Units on hand, never negative
    pub stock: i32,

    /// Stock level at or below which a deduct raises an alert
    pub low_stock_threshold: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

/// Product entity relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
    #[sea_orm(has_many = "super::stock_alert::Entity")]
    StockAlerts,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

impl Related<super::stock_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAlerts.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
            if let ActiveValue::NotSet = active_model.stock {
                active_model.stock = Set(0);
            }
        }

        if let ActiveValue::Set(stock) = active_model.stock {
            if stock < 0 {
                return Err(DbErr::Custom(format!(
                    "stock cannot be negative (got {})",
                    stock
                )));
            }
        }

        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
