use super::common::{success_response, ValidatedQuery};
use crate::{
    auth::RequestContext,
    errors::{ErrorResponse, ServiceError},
    handlers::AppState,
    services::analytics::{AnalyticsQuery, AnalyticsSummary, TopProduct},
};
use axum::{extract::State, response::Response};

/// Totals and daily breakdown for the caller's store
#[utoipa::path(
    get,
    path = "/secure/analytics/summary",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Summary computed", body = AnalyticsSummary),
        (status = 400, description = "days outside 1..=365", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse),
        (status = 404, description = "Merchant has no store", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn analytics_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<AnalyticsQuery>,
) -> Result<Response, ServiceError> {
    let summary = state.services.analytics.summary(&ctx, query).await?;
    Ok(success_response(summary))
}

/// Best-selling products over the period
#[utoipa::path(
    get,
    path = "/secure/analytics/top-products",
    params(AnalyticsQuery),
    responses(
        (status = 200, description = "Top products returned", body = [TopProduct]),
        (status = 400, description = "days or limit out of range", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse),
        (status = 404, description = "Merchant has no store", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "analytics"
)]
pub async fn top_products(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedQuery(query): ValidatedQuery<AnalyticsQuery>,
) -> Result<Response, ServiceError> {
    let top = state.services.analytics.top_products(&ctx, query).await?;
    Ok(success_response(top))
}
