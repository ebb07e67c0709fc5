//! Promotion-aware ordering for store and product listings.
//!
//! Listing handlers fetch their candidate rows as usual and pass them through
//! [`RankingService::apply`], which looks up live promotions for those rows and
//! reorders them:
//!
//! 1. pinned items first, at most `max_pinned` of them; further pins go to the very end
//! 2. boosted items by descending `weight * boost_multiplier`, stable on ties
//! 3. everything else in its original order
//!
//! Ranking is best-effort. If the lookup fails the input order is returned.

use crate::{
    config::RankingConfig,
    db::DbPool,
    entities::{
        product,
        promotion::{self, Entity as Promotion, PromoType, PromotionStatus, TargetType},
        store,
    },
    errors::ServiceError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use tracing::{debug, warn};
use uuid::Uuid;

/// What a listing contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Product,
    Store,
}

/// A listing row that promotions can target.
pub trait Rankable {
    fn item_id(&self) -> Uuid;

    /// The store a product belongs to; stores return `None`.
    fn owning_store_id(&self) -> Option<Uuid>;
}

impl Rankable for product::Model {
    fn item_id(&self) -> Uuid {
        self.id
    }

    fn owning_store_id(&self) -> Option<Uuid> {
        Some(self.store_id)
    }
}

impl Rankable for store::Model {
    fn item_id(&self) -> Uuid {
        self.id
    }

    fn owning_store_id(&self) -> Option<Uuid> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingOptions {
    pub max_pinned: usize,
    pub boost_multiplier: f64,
}

impl Default for RankingOptions {
    fn default() -> Self {
        RankingConfig::default().into()
    }
}

impl From<RankingConfig> for RankingOptions {
    fn from(cfg: RankingConfig) -> Self {
        Self {
            max_pinned: cfg.max_pinned,
            boost_multiplier: cfg.boost_multiplier,
        }
    }
}

/// The promotion that placed an item, as shown to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionTag {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub promo_type: PromoType,
}

/// A listing row plus the promotion applied to it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromotionTag>,
}

impl<T> RankedItem<T> {
    fn plain(item: T) -> Self {
        Self {
            item,
            promotion: None,
        }
    }
}

/// Source of live promotions for a set of stores and products.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromotionLookup: Send + Sync {
    /// Promotions that are not cancelled and whose window contains `now`, targeting
    /// any of `store_ids` (store level) or `product_ids` (product level).
    async fn live_promotions(
        &self,
        store_ids: Vec<Uuid>,
        product_ids: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<promotion::Model>, ServiceError>;
}

/// [`PromotionLookup`] backed by the promotions table.
pub struct DbPromotionLookup {
    db: Arc<DbPool>,
}

impl DbPromotionLookup {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PromotionLookup for DbPromotionLookup {
    async fn live_promotions(
        &self,
        store_ids: Vec<Uuid>,
        product_ids: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<promotion::Model>, ServiceError> {
        if store_ids.is_empty() && product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut targets = Condition::any();
        if !store_ids.is_empty() {
            targets = targets.add(
                Condition::all()
                    .add(promotion::Column::TargetType.eq(TargetType::Store))
                    .add(promotion::Column::StoreId.is_in(store_ids)),
            );
        }
        if !product_ids.is_empty() {
            targets = targets.add(
                Condition::all()
                    .add(promotion::Column::TargetType.eq(TargetType::Product))
                    .add(promotion::Column::TargetId.is_in(product_ids)),
            );
        }

        let rows = Promotion::find()
            .filter(promotion::Column::Status.ne(PromotionStatus::Cancelled))
            .filter(promotion::Column::StartAt.lte(now))
            .filter(promotion::Column::EndAt.gt(now))
            .filter(targets)
            .all(self.db.as_ref())
            .await?;

        Ok(rows.into_iter().filter(|p| p.is_live_at(now)).collect())
    }
}

/// Orders two candidate promotions for the same item; `Less` wins.
///
/// Pin beats boost, product level beats store level, then higher weight,
/// then the most recently created, then the smallest id.
fn precedence(a: &promotion::Model, b: &promotion::Model) -> Ordering {
    let type_rank = |p: &promotion::Model| match p.promo_type {
        PromoType::Pin => 0,
        PromoType::Boost => 1,
    };
    let level_rank = |p: &promotion::Model| match p.target_type {
        TargetType::Product => 0,
        TargetType::Store => 1,
    };

    type_rank(a)
        .cmp(&type_rank(b))
        .then_with(|| level_rank(a).cmp(&level_rank(b)))
        .then_with(|| b.weight.cmp(&a.weight))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Picks the winning promotion for every item id in the listing.
fn winning_promotions<'p, T: Rankable>(
    items: &[T],
    kind: ItemKind,
    promotions: &'p [promotion::Model],
) -> HashMap<Uuid, &'p promotion::Model> {
    let mut by_product: HashMap<Uuid, Vec<&promotion::Model>> = HashMap::new();
    let mut by_store: HashMap<Uuid, Vec<&promotion::Model>> = HashMap::new();
    for promo in promotions {
        match (promo.target_type, promo.target_id) {
            (TargetType::Product, Some(target)) => by_product.entry(target).or_default().push(promo),
            (TargetType::Store, _) => by_store.entry(promo.store_id).or_default().push(promo),
            (TargetType::Product, None) => {}
        }
    }

    let mut winners = HashMap::new();
    for item in items {
        let id = item.item_id();
        let store_scope = match kind {
            ItemKind::Store => Some(id),
            ItemKind::Product => item.owning_store_id(),
        };

        let product_level: &[&promotion::Model] = match kind {
            ItemKind::Product => by_product.get(&id).map(Vec::as_slice).unwrap_or_default(),
            ItemKind::Store => &[],
        };
        let store_level: &[&promotion::Model] = store_scope
            .and_then(|store_id| by_store.get(&store_id))
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Some(best) = product_level
            .iter()
            .chain(store_level.iter())
            .copied()
            .min_by(|a, b| precedence(a, b))
        {
            winners.insert(id, best);
        }
    }
    winners
}

/// Reorders `items` according to `promotions`. Pure; the input order is the
/// fallback order for everything without a promotion.
pub fn rank<T: Rankable>(
    items: Vec<T>,
    kind: ItemKind,
    promotions: &[promotion::Model],
    options: RankingOptions,
) -> Vec<RankedItem<T>> {
    if promotions.is_empty() {
        return items.into_iter().map(RankedItem::plain).collect();
    }

    let winners = winning_promotions(&items, kind, promotions);

    let mut pinned = Vec::new();
    let mut boosted: Vec<(f64, RankedItem<T>)> = Vec::new();
    let mut normal = Vec::new();

    for item in items {
        match winners.get(&item.item_id()).copied() {
            Some(promo) => {
                let tag = PromotionTag {
                    id: promo.id,
                    promo_type: promo.promo_type,
                };
                let ranked = RankedItem {
                    item,
                    promotion: Some(tag),
                };
                match promo.promo_type {
                    PromoType::Pin => pinned.push(ranked),
                    PromoType::Boost => {
                        let score = f64::from(promo.weight) * options.boost_multiplier;
                        boosted.push((score, ranked));
                    }
                }
            }
            None => normal.push(RankedItem::plain(item)),
        }
    }

    // Stable sort keeps input order between equal scores.
    boosted.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    let overflow = if pinned.len() > options.max_pinned {
        pinned.split_off(options.max_pinned)
    } else {
        Vec::new()
    };

    let mut ranked = Vec::with_capacity(pinned.len() + boosted.len() + normal.len() + overflow.len());
    ranked.extend(pinned);
    ranked.extend(boosted.into_iter().map(|(_, item)| item));
    ranked.extend(normal);
    ranked.extend(overflow);
    ranked
}

/// Entry point used by listing handlers.
#[derive(Clone)]
pub struct RankingService {
    lookup: Arc<dyn PromotionLookup>,
    defaults: RankingOptions,
}

impl RankingService {
    pub fn new(lookup: Arc<dyn PromotionLookup>, defaults: RankingOptions) -> Self {
        Self { lookup, defaults }
    }

    /// Ranks with the configured defaults.
    pub async fn apply<T: Rankable>(&self, items: Vec<T>, kind: ItemKind) -> Vec<RankedItem<T>> {
        self.apply_with(items, kind, self.defaults).await
    }

    /// Ranks with explicit options. Never fails: on lookup errors the input order is kept.
    pub async fn apply_with<T: Rankable>(
        &self,
        items: Vec<T>,
        kind: ItemKind,
        options: RankingOptions,
    ) -> Vec<RankedItem<T>> {
        if items.is_empty() {
            return Vec::new();
        }

        let (store_ids, product_ids) = match kind {
            ItemKind::Store => (items.iter().map(Rankable::item_id).collect(), Vec::new()),
            ItemKind::Product => {
                let mut stores: Vec<Uuid> =
                    items.iter().filter_map(Rankable::owning_store_id).collect();
                stores.sort_unstable();
                stores.dedup();
                (stores, items.iter().map(Rankable::item_id).collect())
            }
        };

        match self
            .lookup
            .live_promotions(store_ids, product_ids, Utc::now())
            .await
        {
            Ok(promotions) => {
                debug!(
                    items = items.len(),
                    promotions = promotions.len(),
                    "ranking listing"
                );
                rank(items, kind, &promotions, options)
            }
            Err(e) => {
                counter!("mbuy_ranking.fallbacks", 1);
                warn!(error = %e, "promotion lookup failed; returning listing unranked");
                items.into_iter().map(RankedItem::plain).collect()
            }
        }
    }
}
