use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        audit_log::Severity,
        inventory_movement::{self, Entity as InventoryMovement, MovementReason},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::{AuditEntry, AuditLogger},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Reads of the product row before a concurrent writer is reported.
const MAX_CAS_ATTEMPTS: usize = 3;

pub const DEFAULT_MOVEMENT_LIMIT: u64 = 50;
pub const MAX_MOVEMENT_LIMIT: u64 = 200;

/// Body of `POST /secure/inventory/adjust`
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    pub product_id: Uuid,
    /// Signed change in units; `quantity` is accepted as an alias
    #[serde(alias = "quantity")]
    pub delta: i32,
    /// Defaults to `manual_adjust`; order reasons are rejected here
    pub reason: Option<MovementReason>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Result of one stock change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdjustmentOutcome {
    pub movement_id: Uuid,
    pub product_id: Uuid,
    pub stock_before: i32,
    pub stock_after: i32,
    pub alert_triggered: bool,
}

/// Stock effect of an order transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStockAction {
    Reserved,
    Paid,
    Cancelled,
}

impl OrderStockAction {
    fn reason(self) -> MovementReason {
        match self {
            OrderStockAction::Reserved => MovementReason::OrderReserved,
            OrderStockAction::Paid => MovementReason::OrderPaid,
            OrderStockAction::Cancelled => MovementReason::OrderCancelled,
        }
    }

    /// Signed delta for `quantity` units.
    fn delta(self, quantity: i32) -> i32 {
        match self {
            OrderStockAction::Reserved | OrderStockAction::Paid => -quantity,
            OrderStockAction::Cancelled => quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    /// 1..=200, default 50
    pub limit: Option<u64>,
}

/// Stock after applying `delta`, floored at zero.
pub fn floored_stock(stock_before: i32, delta: i32) -> i32 {
    stock_before.saturating_add(delta).max(0)
}

/// Edge trigger: true only when this change moves stock from above the threshold to at or below it.
pub fn crosses_low_stock(enabled: bool, threshold: i32, stock_before: i32, stock_after: i32) -> bool {
    enabled && stock_before > threshold && stock_after <= threshold
}

/// One stock change waiting to be written.
#[derive(Debug, Clone)]
struct PendingMovement {
    product_id: Uuid,
    delta: i32,
    reason: MovementReason,
    reference_type: Option<String>,
    reference_id: Option<Uuid>,
    notes: Option<String>,
}

/// A committed movement plus what post-commit effects need to know.
struct Applied {
    outcome: AdjustmentOutcome,
    reason: MovementReason,
    delta: i32,
    threshold: i32,
}

/// Append-only stock ledger.
///
/// Every change reads the product, writes the floored stock with a
/// compare-and-set on the value it read, and appends a movement row, all in one
/// transaction. Audit entries and events follow the commit.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    audit: AuditLogger,
    events: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, audit: AuditLogger, events: Arc<EventSender>) -> Self {
        Self { db, audit, events }
    }

    #[instrument(skip(self, ctx, req), fields(merchant_id = %ctx.merchant_id, product_id = %req.product_id))]
    pub async fn adjust(
        &self,
        ctx: &RequestContext,
        req: AdjustStockRequest,
    ) -> Result<AdjustmentOutcome, ServiceError> {
        req.validate()?;
        if req.delta == 0 {
            return Err(ServiceError::ValidationError(
                "delta must be a non-zero integer".to_string(),
            ));
        }
        let reason = req.reason.unwrap_or(MovementReason::ManualAdjust);
        if reason.is_order_flow() {
            return Err(ServiceError::ValidationError(format!(
                "reason '{}' is reserved for order processing",
                reason
            )));
        }

        let pending = PendingMovement {
            product_id: req.product_id,
            delta: req.delta,
            reason,
            reference_type: None,
            reference_id: None,
            notes: req.notes,
        };

        let mut applied = self.write(ctx, vec![pending]).await?;
        let applied = applied
            .pop()
            .ok_or_else(|| ServiceError::InternalError("adjustment produced no movement".into()))?;
        self.after_commit(ctx, &applied, "inventory.adjust").await;

        Ok(applied.outcome)
    }

    /// Applies the stock effect of an order transition to every line, atomically.
    #[instrument(skip(self, ctx, lines), fields(merchant_id = %ctx.merchant_id, %order_id))]
    pub async fn apply_order_movement(
        &self,
        ctx: &RequestContext,
        order_id: Uuid,
        lines: &[OrderLine],
        action: OrderStockAction,
    ) -> Result<Vec<AdjustmentOutcome>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "order has no lines".to_string(),
            ));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
            return Err(ServiceError::ValidationError(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        let pending = lines
            .iter()
            .map(|line| PendingMovement {
                product_id: line.product_id,
                delta: action.delta(line.quantity),
                reason: action.reason(),
                reference_type: Some("order".to_string()),
                reference_id: Some(order_id),
                notes: None,
            })
            .collect();

        let applied = self.write(ctx, pending).await?;
        for movement in &applied {
            self.after_commit(ctx, movement, "inventory.order_movement").await;
        }

        Ok(applied.into_iter().map(|a| a.outcome).collect())
    }

    /// Ledger rows for the caller's merchant, newest first.
    pub async fn list_movements(
        &self,
        ctx: &RequestContext,
        filter: MovementFilter,
    ) -> Result<Vec<inventory_movement::Model>, ServiceError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_MOVEMENT_LIMIT)
            .clamp(1, MAX_MOVEMENT_LIMIT);

        let mut query = InventoryMovement::find()
            .filter(inventory_movement::Column::MerchantId.eq(ctx.merchant_id));
        if let Some(product_id) = filter.product_id {
            query = query.filter(inventory_movement::Column::ProductId.eq(product_id));
        }

        Ok(query
            .order_by_desc(inventory_movement::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }

    /// Alert-enabled products at or below their threshold, lowest stock first.
    pub async fn low_stock(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::MerchantId.eq(ctx.merchant_id))
            .filter(product::Column::AlertEnabled.eq(true))
            .filter(
                Expr::col(product::Column::Stock).lte(Expr::col(product::Column::LowStockThreshold)),
            )
            .order_by_asc(product::Column::Stock)
            .all(self.db.as_ref())
            .await?)
    }

    async fn write(
        &self,
        ctx: &RequestContext,
        pending: Vec<PendingMovement>,
    ) -> Result<Vec<Applied>, ServiceError> {
        let merchant_id = ctx.merchant_id;
        let actor_id = ctx.actor_id;

        self.db
            .transaction::<_, Vec<Applied>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut applied = Vec::with_capacity(pending.len());
                    for movement in pending {
                        applied.push(move_stock(txn, merchant_id, actor_id, movement).await?);
                    }
                    Ok(applied)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }

    async fn after_commit(&self, ctx: &RequestContext, applied: &Applied, action: &str) {
        let outcome = &applied.outcome;
        counter!("mbuy_inventory.adjustments", 1, "reason" => applied.reason.to_string());
        info!(
            product_id = %outcome.product_id,
            stock_before = outcome.stock_before,
            stock_after = outcome.stock_after,
            reason = %applied.reason,
            "stock adjusted"
        );

        let severity = if applied.reason == MovementReason::Damage {
            Severity::Warning
        } else {
            Severity::Info
        };
        self.audit
            .record(
                AuditEntry::new(action, "product")
                    .by(ctx)
                    .entity_id(outcome.product_id)
                    .severity(severity)
                    .meta(json!({
                        "movement_id": outcome.movement_id,
                        "delta": applied.delta,
                        "reason": applied.reason,
                        "stock_before": outcome.stock_before,
                        "stock_after": outcome.stock_after,
                    })),
            )
            .await;

        self.events.publish(Event::StockAdjusted {
            product_id: outcome.product_id,
            merchant_id: ctx.merchant_id,
            stock_before: outcome.stock_before,
            stock_after: outcome.stock_after,
            reason: applied.reason.to_string(),
            movement_id: outcome.movement_id,
        });

        if outcome.alert_triggered {
            counter!("mbuy_inventory.low_stock_alerts", 1);
            warn!(product_id = %outcome.product_id, stock = outcome.stock_after, "low stock threshold crossed");
            self.events.publish(Event::LowStockAlert {
                product_id: outcome.product_id,
                merchant_id: ctx.merchant_id,
                stock: outcome.stock_after,
                threshold: applied.threshold,
            });
        }
    }
}

/// Reads, compare-and-sets and records one movement inside `txn`.
async fn move_stock(
    txn: &DatabaseTransaction,
    merchant_id: Uuid,
    actor_id: Uuid,
    movement: PendingMovement,
) -> Result<Applied, ServiceError> {
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = Product::find_by_id(movement.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", movement.product_id))
            })?;
        if current.merchant_id != merchant_id {
            return Err(ServiceError::Forbidden(
                "Product belongs to another merchant".to_string(),
            ));
        }

        let stock_before = current.stock;
        let stock_after = floored_stock(stock_before, movement.delta);
        let now = Utc::now();

        let updated = Product::update_many()
            .col_expr(product::Column::Stock, Expr::value(stock_after))
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(movement.product_id))
            .filter(product::Column::Stock.eq(stock_before))
            .exec(txn)
            .await?;

        if updated.rows_affected == 0 {
            debug!(attempt, product_id = %movement.product_id, "stock changed underneath, retrying");
            continue;
        }

        let row = inventory_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(movement.product_id),
            merchant_id: Set(merchant_id),
            delta: Set(movement.delta),
            stock_before: Set(stock_before),
            stock_after: Set(stock_after),
            reason: Set(movement.reason),
            reference_type: Set(movement.reference_type.clone()),
            reference_id: Set(movement.reference_id),
            actor_user_id: Set(Some(actor_id)),
            notes: Set(movement.notes.clone()),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;

        return Ok(Applied {
            outcome: AdjustmentOutcome {
                movement_id: row.id,
                product_id: movement.product_id,
                stock_before,
                stock_after,
                alert_triggered: crosses_low_stock(
                    current.alert_enabled,
                    current.low_stock_threshold,
                    stock_before,
                    stock_after,
                ),
            },
            reason: movement.reason,
            delta: movement.delta,
            threshold: current.low_stock_threshold,
        });
    }

    warn!(product_id = %movement.product_id, "giving up after concurrent stock updates");
    Err(ServiceError::ConcurrentModification(movement.product_id))
}
