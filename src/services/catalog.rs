use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        store::{self, Entity as Store},
    },
    errors::ServiceError,
    services::ranking::{ItemKind, RankedItem, RankingService},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

/// Public storefront listings, ordered by promotions.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    ranking: RankingService,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, ranking: RankingService) -> Self {
        Self { db, ranking }
    }

    /// Active stores, newest first before ranking.
    pub async fn list_stores(&self) -> Result<Vec<RankedItem<store::Model>>, ServiceError> {
        let stores = Store::find()
            .filter(store::Column::IsActive.eq(true))
            .order_by_desc(store::Column::CreatedAt)
            .order_by_asc(store::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(self.ranking.apply(stores, ItemKind::Store).await)
    }

    /// Active products of one active store, newest first before ranking.
    pub async fn list_store_products(
        &self,
        store_id: Uuid,
    ) -> Result<Vec<RankedItem<product::Model>>, ServiceError> {
        Store::find_by_id(store_id)
            .filter(store::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Store {} not found", store_id)))?;

        let products = Product::find()
            .filter(product::Column::StoreId.eq(store_id))
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(self.ranking.apply(products, ItemKind::Product).await)
    }
}
