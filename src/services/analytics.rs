use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::RequestContext,
    db::DbPool,
    entities::{
        analytics_daily_rollup::{self, Entity as DailyRollup},
        store::{self, Entity as Store},
    },
    errors::ServiceError,
};

pub const DEFAULT_PERIOD_DAYS: u32 = 30;
pub const DEFAULT_TOP_PRODUCTS: usize = 10;

#[derive(Debug, Default, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsQuery {
    /// Number of calendar days ending today (UTC), 1..=365, default 30
    #[validate(range(min = 1, max = 365))]
    pub days: Option<u32>,
    /// Only used by top products, 1..=50, default 10
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

impl AnalyticsQuery {
    pub fn period_days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_PERIOD_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub views: i64,
    pub clicks: i64,
    pub orders: i64,
    pub revenue: Decimal,
}

impl DailyTotals {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            views: 0,
            clicks: 0,
            orders: 0,
            revenue: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsSummary {
    pub total_views: i64,
    pub total_clicks: i64,
    pub total_orders: i64,
    pub total_revenue: Decimal,
    /// clicks / views, as a percentage with two decimals
    pub avg_ctr: f64,
    /// orders / views, as a percentage with two decimals
    pub avg_conversion: f64,
    /// One entry per date with rows, oldest first
    pub daily: Vec<DailyTotals>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub views: i64,
    pub clicks: i64,
    pub orders: i64,
    pub revenue: Decimal,
}

/// `part / whole` as a percentage rounded to two decimals, 0 when `whole` is 0.
fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Folds product-level rollup rows into per-date and whole-period totals.
///
/// Store-wide rows (`product_id` unset) already aggregate their products and
/// are skipped.
pub fn summarize_rows(rows: &[analytics_daily_rollup::Model]) -> AnalyticsSummary {
    let mut by_date: BTreeMap<NaiveDate, DailyTotals> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.product_id.is_some()) {
        let day = by_date
            .entry(row.date)
            .or_insert_with(|| DailyTotals::empty(row.date));
        day.views += row.views;
        day.clicks += row.clicks;
        day.orders += row.orders;
        day.revenue += row.revenue;
    }

    let daily: Vec<DailyTotals> = by_date.into_values().collect();
    let total_views = daily.iter().map(|d| d.views).sum();
    let total_clicks = daily.iter().map(|d| d.clicks).sum();
    let total_orders = daily.iter().map(|d| d.orders).sum();
    let total_revenue = daily.iter().map(|d| d.revenue).sum();

    AnalyticsSummary {
        total_views,
        total_clicks,
        total_orders,
        total_revenue,
        avg_ctr: percentage(total_clicks, total_views),
        avg_conversion: percentage(total_orders, total_views),
        daily,
    }
}

/// Sums product-level rows per product; best sellers first.
pub fn rank_products(rows: &[analytics_daily_rollup::Model], limit: usize) -> Vec<TopProduct> {
    let mut by_product: HashMap<Uuid, TopProduct> = HashMap::new();
    for row in rows {
        let Some(product_id) = row.product_id else {
            continue;
        };
        let entry = by_product.entry(product_id).or_insert_with(|| TopProduct {
            product_id,
            views: 0,
            clicks: 0,
            orders: 0,
            revenue: Decimal::ZERO,
        });
        entry.views += row.views;
        entry.clicks += row.clicks;
        entry.orders += row.orders;
        entry.revenue += row.revenue;
    }

    let mut ranked: Vec<TopProduct> = by_product.into_values().collect();
    ranked.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then_with(|| b.orders.cmp(&a.orders))
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    ranked.truncate(limit);
    ranked
}

/// Read side of the daily rollup table for merchant dashboards
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DbPool>,
}

impl AnalyticsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn summary(
        &self,
        ctx: &RequestContext,
        query: AnalyticsQuery,
    ) -> Result<AnalyticsSummary, ServiceError> {
        query.validate()?;
        let store_id = self.merchant_store(ctx).await?;
        let rows = self.rows_for_period(store_id, query.period_days()).await?;
        let summary = summarize_rows(&rows);

        info!(
            %store_id,
            days = query.period_days(),
            rows = rows.len(),
            "analytics summary computed"
        );
        Ok(summary)
    }

    pub async fn top_products(
        &self,
        ctx: &RequestContext,
        query: AnalyticsQuery,
    ) -> Result<Vec<TopProduct>, ServiceError> {
        query.validate()?;
        let store_id = self.merchant_store(ctx).await?;
        let rows = self.rows_for_period(store_id, query.period_days()).await?;
        Ok(rank_products(
            &rows,
            query.limit.unwrap_or(DEFAULT_TOP_PRODUCTS),
        ))
    }

    async fn merchant_store(&self, ctx: &RequestContext) -> Result<Uuid, ServiceError> {
        Store::find()
            .filter(store::Column::MerchantId.eq(ctx.merchant_id))
            .order_by_asc(store::Column::CreatedAt)
            .one(self.db.as_ref())
            .await?
            .map(|s| s.id)
            .ok_or_else(|| ServiceError::NotFound("Store not found for merchant".to_string()))
    }

    async fn rows_for_period(
        &self,
        store_id: Uuid,
        days: u32,
    ) -> Result<Vec<analytics_daily_rollup::Model>, ServiceError> {
        let today = Utc::now().date_naive();
        let from = today - Duration::days(i64::from(days) - 1);

        Ok(DailyRollup::find()
            .filter(analytics_daily_rollup::Column::StoreId.eq(store_id))
            .filter(analytics_daily_rollup::Column::ProductId.is_not_null())
            .filter(analytics_daily_rollup::Column::Date.gte(from))
            .filter(analytics_daily_rollup::Column::Date.lte(today))
            .order_by_asc(analytics_daily_rollup::Column::Date)
            .all(self.db.as_ref())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(
        date: &str,
        product_id: Option<Uuid>,
        views: i64,
        clicks: i64,
        orders: i64,
        revenue: Decimal,
    ) -> analytics_daily_rollup::Model {
        analytics_daily_rollup::Model {
            id: Uuid::new_v4(),
            date: date.parse().unwrap(),
            store_id: Uuid::nil(),
            product_id,
            views,
            clicks,
            orders,
            revenue,
        }
    }

    #[test]
    fn empty_period_reports_zero_rates() {
        let summary = summarize_rows(&[]);
        assert_eq!(summary.total_views, 0);
        assert_eq!(summary.avg_ctr, 0.0);
        assert_eq!(summary.avg_conversion, 0.0);
        assert!(summary.daily.is_empty());
    }

    #[test]
    fn groups_by_date_in_ascending_order() {
        let a = Some(Uuid::new_v4());
        let b = Some(Uuid::new_v4());
        let rows = vec![
            row("2024-06-02", a, 100, 10, 2, dec!(40.00)),
            row("2024-06-01", a, 50, 5, 1, dec!(20.00)),
            row("2024-06-02", b, 200, 20, 3, dec!(60.50)),
        ];

        let summary = summarize_rows(&rows);
        assert_eq!(summary.daily.len(), 2);
        assert_eq!(summary.daily[0].date.to_string(), "2024-06-01");
        assert_eq!(summary.daily[1].views, 300);
        assert_eq!(summary.daily[1].revenue, dec!(100.50));
        assert_eq!(summary.total_views, 350);
        assert_eq!(summary.total_clicks, 35);
        assert_eq!(summary.total_orders, 6);
        assert_eq!(summary.total_revenue, dec!(120.50));
        assert_eq!(summary.avg_ctr, 10.0);
        assert_eq!(summary.avg_conversion, 1.71);
    }

    #[test]
    fn clicks_without_views_still_report_zero() {
        let rows = vec![row("2024-06-01", Some(Uuid::new_v4()), 0, 3, 1, dec!(5))];
        let summary = summarize_rows(&rows);
        assert_eq!(summary.avg_ctr, 0.0);
        assert_eq!(summary.avg_conversion, 0.0);
    }

    #[test]
    fn store_wide_rows_are_not_added_to_product_rows() {
        let rows = vec![
            row("2024-06-01", None, 100, 10, 2, dec!(40)),
            row("2024-06-01", Some(Uuid::new_v4()), 100, 10, 2, dec!(40)),
        ];

        let summary = summarize_rows(&rows);
        assert_eq!(summary.total_views, 100);
        assert_eq!(summary.daily.len(), 1);
        assert_eq!(summary.daily[0].views, 100);
        assert_eq!(summary.total_revenue, dec!(40));
    }

    #[test]
    fn top_products_skip_store_rows_and_sort_by_revenue() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![
            row("2024-06-01", Some(a), 10, 1, 1, dec!(10)),
            row("2024-06-02", Some(a), 10, 1, 1, dec!(10)),
            row("2024-06-01", Some(b), 10, 1, 5, dec!(15)),
            row("2024-06-01", None, 999, 99, 99, dec!(999)),
        ];

        let top = rank_products(&rows, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].product_id, a);
        assert_eq!(top[0].revenue, dec!(20));
        assert_eq!(top[1].product_id, b);

        assert_eq!(rank_products(&rows, 1).len(), 1);
    }

    #[test]
    fn days_outside_range_fail_validation() {
        assert!(AnalyticsQuery { days: Some(0), limit: None }.validate().is_err());
        assert!(AnalyticsQuery { days: Some(366), limit: None }.validate().is_err());
        assert!(AnalyticsQuery::default().validate().is_ok());
        assert_eq!(AnalyticsQuery::default().period_days(), 30);
    }
}
