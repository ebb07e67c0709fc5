use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::audit_log::{self, Entity as AuditLog, Severity},
    errors::ServiceError,
    middleware_helpers::sanitize::redact_sensitive,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::IntoParams;
use uuid::Uuid;

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 200;

/// A single auditable action, built by the service performing it.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub merchant_id: Option<Uuid>,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub severity: Severity,
    pub meta: Value,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            merchant_id: None,
            actor_user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            severity: Severity::Info,
            meta: Value::Object(Default::default()),
        }
    }

    /// Fills merchant and actor from the caller.
    pub fn by(mut self, ctx: &RequestContext) -> Self {
        self.merchant_id = Some(ctx.merchant_id);
        self.actor_user_id = Some(ctx.actor_id);
        self
    }

    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilter {
    pub entity_type: Option<String>,
    pub severity: Option<Severity>,
    /// 1..=200, default 50
    pub limit: Option<u64>,
}

/// Append-only audit writer.
///
/// [`AuditLogger::record`] is the best-effort sink used by business operations:
/// a failed write is logged and counted and never reaches the caller.
#[derive(Clone)]
pub struct AuditLogger {
    db: Arc<DbPool>,
}

impl AuditLogger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Writes the entry, swallowing any failure.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.try_record(entry).await {
            counter!("mbuy_audit.write_failures", 1);
            error!(action = %action, error = %e, "failed to write audit log entry");
        }
    }

    /// Writes the entry and reports the outcome.
    pub async fn try_record(&self, entry: AuditEntry) -> Result<audit_log::Model, ServiceError> {
        let model = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            merchant_id: Set(entry.merchant_id),
            actor_user_id: Set(entry.actor_user_id),
            action: Set(entry.action),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            severity: Set(entry.severity),
            meta: Set(redact_sensitive(&entry.meta)),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;

        debug!(audit_id = %model.id, action = %model.action, "audit entry written");
        Ok(model)
    }

    /// Entries for the caller's merchant, newest first.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        filter: AuditLogFilter,
    ) -> Result<Vec<audit_log::Model>, ServiceError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let mut query = AuditLog::find().filter(audit_log::Column::MerchantId.eq(ctx.merchant_id));
        if let Some(entity_type) = filter.entity_type {
            query = query.filter(audit_log::Column::EntityType.eq(entity_type));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(audit_log::Column::Severity.eq(severity));
        }

        Ok(query
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection, run_migrations};
    use crate::middleware_helpers::sanitize::REDACTED;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext {
            actor_id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            roles: vec![],
            request_id: None,
        }
    }

    async fn logger() -> AuditLogger {
        let db = establish_connection("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();
        AuditLogger::new(Arc::new(db))
    }

    #[tokio::test]
    async fn stored_meta_is_redacted() {
        let logger = logger().await;
        let entry = AuditEntry::new("settings.update", "store")
            .by(&ctx())
            .meta(json!({ "webhook": { "signing_secret": "s3cr3t" }, "name": "Main" }));

        let stored = logger.try_record(entry).await.unwrap();
        assert_eq!(stored.meta["webhook"]["signing_secret"], REDACTED);
        assert_eq!(stored.meta["name"], "Main");
        assert!(!stored.meta.to_string().contains("s3cr3t"));
    }

    #[tokio::test]
    async fn record_swallows_storage_failures() {
        // No migrations: the insert fails.
        let db = establish_connection("sqlite::memory:").await.unwrap();
        let logger = AuditLogger::new(Arc::new(db));
        logger
            .record(AuditEntry::new("inventory.adjust", "product"))
            .await;
        assert!(logger
            .try_record(AuditEntry::new("inventory.adjust", "product"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn list_is_scoped_filtered_and_clamped() {
        let logger = logger().await;
        let me = ctx();
        let other = ctx();

        logger
            .record(AuditEntry::new("inventory.adjust", "product").by(&me).severity(Severity::Warning))
            .await;
        logger
            .record(AuditEntry::new("promotion.create", "promotion").by(&me))
            .await;
        logger
            .record(AuditEntry::new("promotion.create", "promotion").by(&other))
            .await;

        let all = logger.list(&me, AuditLogFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let warnings = logger
            .list(
                &me,
                AuditLogFilter {
                    severity: Some(Severity::Warning),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].entity_type, "product");

        let clamped = logger
            .list(
                &me,
                AuditLogFilter {
                    limit: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(clamped.len(), 1);
    }
}
