use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        promotion::{self, Entity as Promotion, PromoType, PromotionStatus, TargetType},
        store::{self, Entity as Store},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::audit::{AuditEntry, AuditLogger},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Body of `POST /secure/promotions`
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[validate(schema(function = "validate_window", skip_on_field_errors = false))]
pub struct CreatePromotionRequest {
    pub target_type: TargetType,
    /// Required for product targets, must be absent for store targets
    pub target_id: Option<Uuid>,
    pub promo_type: PromoType,
    /// Boost weight, defaults to 1
    #[validate(range(min = 0, max = 1000))]
    pub weight: Option<i32>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[validate(range(min = 0))]
    pub budget_points: Option<i64>,
}

fn validate_window(req: &CreatePromotionRequest) -> Result<(), ValidationError> {
    if req.end_at <= req.start_at {
        let mut err = ValidationError::new("end_at");
        err.message = Some("end_at must be after start_at".into());
        return Err(err);
    }
    Ok(())
}

/// What a promotion points at, once the request has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionTarget {
    Store,
    Product(Uuid),
}

impl CreatePromotionRequest {
    pub fn target(&self) -> Result<PromotionTarget, ServiceError> {
        match (self.target_type, self.target_id) {
            (TargetType::Product, Some(id)) => Ok(PromotionTarget::Product(id)),
            (TargetType::Product, None) => Err(ServiceError::ValidationError(
                "target_id is required for product promotions".to_string(),
            )),
            (TargetType::Store, None) => Ok(PromotionTarget::Store),
            (TargetType::Store, Some(_)) => Err(ServiceError::ValidationError(
                "target_id must be omitted for store promotions".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PromotionFilter {
    pub status: Option<PromotionStatus>,
    pub target_type: Option<TargetType>,
    pub promo_type: Option<PromoType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepSummary {
    pub activated: u64,
    pub expired: u64,
}

impl SweepSummary {
    pub fn updated(&self) -> u64 {
        self.activated + self.expired
    }
}

/// Promotion records for the caller's merchant.
///
/// The stored `status` is a snapshot. It is written at creation and refreshed by
/// [`PromotionService::get`], [`PromotionService::cancel`] and
/// [`PromotionService::sweep`]; ranking never trusts it for the time window.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DbPool>,
    audit: AuditLogger,
    events: Arc<EventSender>,
}

impl PromotionService {
    pub fn new(db: Arc<DbPool>, audit: AuditLogger, events: Arc<EventSender>) -> Self {
        Self { db, audit, events }
    }

    #[instrument(skip(self, ctx, req), fields(merchant_id = %ctx.merchant_id))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        req: CreatePromotionRequest,
    ) -> Result<promotion::Model, ServiceError> {
        req.validate()?;
        let target = req.target()?;
        let store_id = self.resolve_store(ctx, target).await?;

        let now = Utc::now();
        let status = PromotionStatus::from_window(req.start_at, req.end_at, now);

        let created = promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            merchant_id: Set(ctx.merchant_id),
            store_id: Set(store_id),
            target_type: Set(req.target_type),
            target_id: Set(req.target_id),
            promo_type: Set(req.promo_type),
            weight: Set(req.weight.unwrap_or(1)),
            start_at: Set(req.start_at),
            end_at: Set(req.end_at),
            status: Set(status),
            budget_points: Set(req.budget_points.unwrap_or(0)),
            created_by: Set(ctx.actor_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(promotion_id = %created.id, status = %created.status, "promotion created");

        self.audit
            .record(
                AuditEntry::new("promotion.create", "promotion")
                    .by(ctx)
                    .entity_id(created.id)
                    .meta(json!({
                        "target_type": created.target_type,
                        "target_id": created.target_id,
                        "promo_type": created.promo_type,
                        "weight": created.weight,
                        "status": created.status,
                    })),
            )
            .await;
        self.events.publish(Event::PromotionCreated {
            promotion_id: created.id,
            merchant_id: ctx.merchant_id,
        });

        Ok(created)
    }

    /// Loads a promotion the caller owns, refreshing its status snapshot.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<promotion::Model, ServiceError> {
        let found = self.find_owned(ctx, id).await?;
        self.refresh_status(found, Utc::now()).await
    }

    #[instrument(skip(self, ctx), fields(merchant_id = %ctx.merchant_id))]
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<promotion::Model, ServiceError> {
        let current = self.get(ctx, id).await?;
        if current.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Promotion is already {}",
                current.status
            )));
        }

        let previous = current.status;
        let mut active: promotion::ActiveModel = current.into();
        active.status = Set(PromotionStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let cancelled = active.update(self.db.as_ref()).await?;

        info!(promotion_id = %cancelled.id, "promotion cancelled");

        self.audit
            .record(
                AuditEntry::new("promotion.cancel", "promotion")
                    .by(ctx)
                    .entity_id(cancelled.id)
                    .meta(json!({ "previous_status": previous })),
            )
            .await;
        self.events.publish(Event::PromotionCancelled {
            promotion_id: cancelled.id,
            merchant_id: ctx.merchant_id,
        });

        Ok(cancelled)
    }

    /// The caller's promotions, newest first.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: PromotionFilter,
    ) -> Result<Vec<promotion::Model>, ServiceError> {
        let mut query = Promotion::find().filter(promotion::Column::MerchantId.eq(ctx.merchant_id));
        if let Some(status) = filter.status {
            query = query.filter(promotion::Column::Status.eq(status));
        }
        if let Some(target_type) = filter.target_type {
            query = query.filter(promotion::Column::TargetType.eq(target_type));
        }
        if let Some(promo_type) = filter.promo_type {
            query = query.filter(promotion::Column::PromoType.eq(promo_type));
        }

        Ok(query
            .order_by_desc(promotion::Column::CreatedAt)
            .order_by_asc(promotion::Column::Id)
            .all(self.db.as_ref())
            .await?)
    }

    /// Brings every non-terminal snapshot of the caller's merchant in line with `now`.
    #[instrument(skip(self, ctx), fields(merchant_id = %ctx.merchant_id))]
    pub async fn sweep(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<SweepSummary, ServiceError> {
        let db = self.db.as_ref();

        let expired = Promotion::update_many()
            .col_expr(promotion::Column::Status, Expr::value(PromotionStatus::Expired))
            .col_expr(promotion::Column::UpdatedAt, Expr::value(now))
            .filter(promotion::Column::MerchantId.eq(ctx.merchant_id))
            .filter(
                promotion::Column::Status
                    .is_in([PromotionStatus::Scheduled, PromotionStatus::Active]),
            )
            .filter(promotion::Column::EndAt.lte(now))
            .exec(db)
            .await?
            .rows_affected;

        let activated = Promotion::update_many()
            .col_expr(promotion::Column::Status, Expr::value(PromotionStatus::Active))
            .col_expr(promotion::Column::UpdatedAt, Expr::value(now))
            .filter(promotion::Column::MerchantId.eq(ctx.merchant_id))
            .filter(promotion::Column::Status.eq(PromotionStatus::Scheduled))
            .filter(promotion::Column::StartAt.lte(now))
            .filter(promotion::Column::EndAt.gt(now))
            .exec(db)
            .await?
            .rows_affected;

        let summary = SweepSummary { activated, expired };
        info!(activated, expired, "promotion sweep finished");

        if summary.updated() > 0 {
            self.audit
                .record(
                    AuditEntry::new("promotion.sweep", "promotion")
                        .by(ctx)
                        .meta(json!({ "activated": activated, "expired": expired })),
                )
                .await;
        }
        if expired > 0 {
            self.events.publish(Event::PromotionsExpired {
                merchant_id: ctx.merchant_id,
                count: expired,
                at: now,
            });
        }

        Ok(summary)
    }

    async fn find_owned(
        &self,
        ctx: &RequestContext,
        id: Uuid,
    ) -> Result<promotion::Model, ServiceError> {
        let found = Promotion::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promotion {} not found", id)))?;

        if found.merchant_id != ctx.merchant_id {
            return Err(ServiceError::Forbidden(
                "Promotion belongs to another merchant".to_string(),
            ));
        }
        Ok(found)
    }

    async fn refresh_status(
        &self,
        promo: promotion::Model,
        now: DateTime<Utc>,
    ) -> Result<promotion::Model, ServiceError> {
        let refreshed = promo.refreshed_status(now);
        if refreshed == promo.status {
            return Ok(promo);
        }

        let mut active: promotion::ActiveModel = promo.into();
        active.status = Set(refreshed);
        active.updated_at = Set(now);
        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Store the promotion is attached to: the product's store, or the merchant's store.
    async fn resolve_store(
        &self,
        ctx: &RequestContext,
        target: PromotionTarget,
    ) -> Result<Uuid, ServiceError> {
        let db = self.db.as_ref();
        match target {
            PromotionTarget::Product(product_id) => Product::find_by_id(product_id)
                .filter(product::Column::MerchantId.eq(ctx.merchant_id))
                .one(db)
                .await?
                .map(|p| p.store_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id))),
            PromotionTarget::Store => Store::find()
                .filter(store::Column::MerchantId.eq(ctx.merchant_id))
                .order_by_asc(store::Column::CreatedAt)
                .one(db)
                .await?
                .map(|s| s.id)
                .ok_or_else(|| ServiceError::NotFound("Store not found for merchant".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection, run_migrations};
    use assert_matches::assert_matches;
    use chrono::Duration;
    use rstest::rstest;

    struct Fixture {
        service: PromotionService,
        db: Arc<DbPool>,
        ctx: RequestContext,
        store_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = establish_connection("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);
        let (events, _rx) = EventSender::channel(16);

        let ctx = RequestContext {
            actor_id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            roles: vec![],
            request_id: None,
        };
        let store_id = Uuid::new_v4();
        store::ActiveModel {
            id: Set(store_id),
            merchant_id: Set(ctx.merchant_id),
            name: Set("Main".into()),
            slug: Set("main".into()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(db.as_ref())
        .await
        .unwrap();

        Fixture {
            service: PromotionService::new(db.clone(), AuditLogger::new(db.clone()), Arc::new(events)),
            db,
            ctx,
            store_id,
        }
    }

    fn store_request(start: Duration, end: Duration) -> CreatePromotionRequest {
        let now = Utc::now();
        CreatePromotionRequest {
            target_type: TargetType::Store,
            target_id: None,
            promo_type: PromoType::Boost,
            weight: None,
            start_at: now + start,
            end_at: now + end,
            budget_points: None,
        }
    }

    #[rstest]
    #[case(TargetType::Product, None)]
    #[case(TargetType::Store, Some(Uuid::nil()))]
    fn target_must_match_type(#[case] target_type: TargetType, #[case] target_id: Option<Uuid>) {
        let mut req = store_request(Duration::zero(), Duration::hours(1));
        req.target_type = target_type;
        req.target_id = target_id;
        assert_matches!(req.target(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn window_must_be_ordered() {
        let req = store_request(Duration::hours(1), Duration::hours(1));
        assert!(req.validate().is_err());
    }

    #[tokio::test]
    async fn create_snapshots_status_and_defaults() {
        let f = fixture().await;
        let active = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-1), Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(active.status, PromotionStatus::Active);
        assert_eq!(active.weight, 1);
        assert_eq!(active.budget_points, 0);
        assert_eq!(active.store_id, f.store_id);

        let scheduled = f
            .service
            .create(&f.ctx, store_request(Duration::hours(1), Duration::hours(2)))
            .await
            .unwrap();
        assert_eq!(scheduled.status, PromotionStatus::Scheduled);
    }

    #[tokio::test]
    async fn expired_promotion_cannot_be_cancelled() {
        let f = fixture().await;
        let expired = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-2), Duration::hours(-1)))
            .await
            .unwrap();
        assert_eq!(expired.status, PromotionStatus::Expired);

        assert_matches!(
            f.service.cancel(&f.ctx, expired.id).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn cancel_twice_is_a_conflict() {
        let f = fixture().await;
        let promo = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-1), Duration::hours(1)))
            .await
            .unwrap();

        let cancelled = f.service.cancel(&f.ctx, promo.id).await.unwrap();
        assert_eq!(cancelled.status, PromotionStatus::Cancelled);
        assert_matches!(
            f.service.cancel(&f.ctx, promo.id).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn other_merchant_gets_forbidden_and_missing_is_not_found() {
        let f = fixture().await;
        let promo = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-1), Duration::hours(1)))
            .await
            .unwrap();

        let intruder = RequestContext {
            merchant_id: Uuid::new_v4(),
            ..f.ctx.clone()
        };
        assert_matches!(
            f.service.cancel(&intruder, promo.id).await,
            Err(ServiceError::Forbidden(_))
        );
        assert_matches!(
            f.service.get(&f.ctx, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn elapsed_window_is_refreshed_on_get() {
        let f = fixture().await;
        let promo = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-1), Duration::hours(1)))
            .await
            .unwrap();

        // Simulate the window elapsing after creation.
        let mut stale: promotion::ActiveModel = promo.clone().into();
        stale.end_at = Set(Utc::now() - Duration::minutes(1));
        stale.update(f.db.as_ref()).await.unwrap();

        let refreshed = f.service.get(&f.ctx, promo.id).await.unwrap();
        assert_eq!(refreshed.status, PromotionStatus::Expired);
        assert_matches!(
            f.service.cancel(&f.ctx, promo.id).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn sweep_moves_snapshots_forward() {
        let f = fixture().await;
        let soon = f
            .service
            .create(&f.ctx, store_request(Duration::hours(1), Duration::hours(3)))
            .await
            .unwrap();
        let running = f
            .service
            .create(&f.ctx, store_request(Duration::hours(-1), Duration::hours(2)))
            .await
            .unwrap();

        let later = Utc::now() + Duration::hours(2) + Duration::minutes(30);
        let summary = f.service.sweep(&f.ctx, later).await.unwrap();
        assert_eq!(summary, SweepSummary { activated: 1, expired: 1 });

        let by_id = |id| {
            let service = f.service.clone();
            let ctx = f.ctx.clone();
            async move {
                service
                    .list(&ctx, PromotionFilter::default())
                    .await
                    .unwrap()
                    .into_iter()
                    .find(|p| p.id == id)
                    .unwrap()
            }
        };
        assert_eq!(by_id(soon.id).await.status, PromotionStatus::Active);
        assert_eq!(by_id(running.id).await.status, PromotionStatus::Expired);
    }

    #[tokio::test]
    async fn product_promotion_requires_owned_product() {
        let f = fixture().await;
        let mut req = store_request(Duration::hours(-1), Duration::hours(1));
        req.target_type = TargetType::Product;
        req.target_id = Some(Uuid::new_v4());
        assert_matches!(
            f.service.create(&f.ctx, req).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
