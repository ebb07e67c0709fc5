use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Why stock moved
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementReason {
    #[sea_orm(string_value = "manual_adjust")]
    ManualAdjust,
    #[sea_orm(string_value = "restock")]
    Restock,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "damage")]
    Damage,
    #[sea_orm(string_value = "order_reserved")]
    OrderReserved,
    #[sea_orm(string_value = "order_paid")]
    OrderPaid,
    #[sea_orm(string_value = "order_cancelled")]
    OrderCancelled,
}

impl MovementReason {
    /// Reasons owned by the order flow; not accepted from the manual endpoint.
    pub fn is_order_flow(self) -> bool {
        matches!(
            self,
            MovementReason::OrderReserved | MovementReason::OrderPaid | MovementReason::OrderCancelled
        )
    }
}

/// Append-only stock ledger row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "inventory_movements")]
#[schema(as = InventoryMovement)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub merchant_id: Uuid,
    /// Requested signed change; the applied change may be smaller when clamped at zero
    pub delta: i32,
    pub stock_before: i32,
    pub stock_after: i32,
    pub reason: MovementReason,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
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
