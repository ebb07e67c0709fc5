use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Product entity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "products")]
#[schema(as = Product)]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning store
    pub store_id: Uuid,

    /// Owning merchant, denormalized from the store for ownership checks
    pub merchant_id: Uuid,

    pub name: String,

    pub price: Decimal,

    /// Units on hand, never negative
    pub stock: i32,

    /// Stock level at or below which a low-stock alert fires
    pub low_stock_threshold: i32,

    /// Whether low-stock alerts are enabled for this product
    pub alert_enabled: bool,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::store::Entity",
        from = "Column::StoreId",
        to = "super::store::Column::Id"
    )]
    Store,
    #[sea_orm(has_many = "super::inventory_movement::Entity")]
    InventoryMovements,
}

impl Related<super::store::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Store.def()
    }
}

impl Related<super::inventory_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryMovements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when alerting is on and stock sits at or below the threshold
    pub fn is_low_stock(&self) -> bool {
        self.alert_enabled && self.stock <= self.low_stock_threshold
    }
}
