use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetType {
    #[sea_orm(string_value = "store")]
    Store,
    #[sea_orm(string_value = "product")]
    Product,
}

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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromoType {
    /// Forces the item to the head of a listing
    #[sea_orm(string_value = "pin")]
    Pin,
    /// Raises the item by `weight * boost_multiplier`
    #[sea_orm(string_value = "boost")]
    Boost,
}

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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromotionStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl PromotionStatus {
    /// Status implied by a `[start_at, end_at)` window at `now`.
    pub fn from_window(start_at: DateTime<Utc>, end_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < start_at {
            PromotionStatus::Scheduled
        } else if now < end_at {
            PromotionStatus::Active
        } else {
            PromotionStatus::Expired
        }
    }

    /// Expired and cancelled promotions can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, PromotionStatus::Expired | PromotionStatus::Cancelled)
    }
}

/// A paid placement on a store or product listing
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "promotions")]
#[schema(as = Promotion)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub merchant_id: Uuid,
    /// Store the promotion belongs to, resolved when the promotion is created
    pub store_id: Uuid,
    pub target_type: TargetType,
    /// Product id for product targets, `None` for store targets
    pub target_id: Option<Uuid>,
    pub promo_type: PromoType,
    pub weight: i32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Snapshot of the window state; refreshed on explicit checks only
    pub status: PromotionStatus,
    pub budget_points: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the promotion takes part in ranking at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status != PromotionStatus::Cancelled && self.start_at <= now && now < self.end_at
    }

    /// Status the snapshot should hold at `now`. Cancellation is sticky.
    pub fn refreshed_status(&self, now: DateTime<Utc>) -> PromotionStatus {
        match self.status {
            PromotionStatus::Cancelled => PromotionStatus::Cancelled,
            _ => PromotionStatus::from_window(self.start_at, self.end_at, now),
        }
    }
}
