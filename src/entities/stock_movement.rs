use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement. The quantity stored alongside is always
/// a magnitude; the kind carries the sign.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MovementKind {
    #[sea_orm(string_value = "add")]
    Add,
    #[sea_orm(string_value = "deduct")]
    Deduct,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether `delta` points in the direction this kind describes.
    pub fn accepts(&self, delta: i32) -> bool {
        match self {
            MovementKind::Add => delta >= 0,
            MovementKind::Deduct => delta <= 0,
        }
    }
}

/// Append-only ledger entry; rows are never updated or deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub product_id: i32,
    pub movement_type: MovementKind,
    /// Magnitude of the change
    pub quantity: i32,
    /// Product stock right after this movement committed
    pub stock_after: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Signed change this movement applied to stock
    pub fn signed_quantity(&self) -> i32 {
        match self.movement_type {
            MovementKind::Add => self.quantity,
            MovementKind::Deduct => -self.quantity,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sign_agreement() {
        assert!(MovementKind::Add.accepts(5));
        assert!(!MovementKind::Add.accepts(-5));
        assert!(MovementKind::Deduct.accepts(-5));
        assert!(!MovementKind::Deduct.accepts(5));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(MovementKind::Deduct.as_str(), "deduct");
        assert_eq!(
            serde_json::to_string(&MovementKind::Add).unwrap(),
            "\"add\""
        );
    }
}
