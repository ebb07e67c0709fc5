pub mod analytics;
pub mod audit_logs;
pub mod catalog;
pub mod common;
pub mod health;
pub mod inventory;
pub mod promotions;

use crate::{
    config::RankingConfig,
    db::DbPool,
    events::EventSender,
    services::{
        analytics::AnalyticsService,
        audit::AuditLogger,
        catalog::CatalogService,
        inventory::InventoryService,
        promotions::PromotionService,
        ranking::{DbPromotionLookup, RankingService},
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub promotions: Arc<PromotionService>,
    pub inventory: Arc<InventoryService>,
    pub audit: Arc<AuditLogger>,
    pub analytics: Arc<AnalyticsService>,
    pub catalog: Arc<CatalogService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, ranking: RankingConfig) -> Self {
        let audit = AuditLogger::new(db_pool.clone());
        let ranking = RankingService::new(
            Arc::new(DbPromotionLookup::new(db_pool.clone())),
            ranking.into(),
        );

        Self {
            promotions: Arc::new(PromotionService::new(
                db_pool.clone(),
                audit.clone(),
                event_sender.clone(),
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                audit.clone(),
                event_sender,
            )),
            analytics: Arc::new(AnalyticsService::new(db_pool.clone())),
            catalog: Arc::new(CatalogService::new(db_pool, ranking)),
            audit: Arc::new(audit),
        }
    }
}
