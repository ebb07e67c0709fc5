use super::common::{success_response, QueryParams, ValidatedJson};
use crate::{
    auth::RequestContext,
    entities::{inventory_movement, product},
    errors::{ErrorResponse, ServiceError},
    handlers::AppState,
    services::inventory::{AdjustStockRequest, AdjustmentOutcome, MovementFilter},
};
use axum::{extract::State, response::Response};

/// Apply a manual stock change and record it in the ledger
#[utoipa::path(
    post,
    path = "/secure/inventory/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = AdjustmentOutcome),
        (status = 400, description = "Invalid request or order-flow reason", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse),
        (status = 404, description = "Product not found for this merchant", body = ErrorResponse),
        (status = 409, description = "Concurrent writers exhausted the retries", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(payload): ValidatedJson<AdjustStockRequest>,
) -> Result<Response, ServiceError> {
    let outcome = state.services.inventory.adjust(&ctx, payload).await?;
    Ok(success_response(outcome))
}

/// Ledger entries for the caller's products, newest first
#[utoipa::path(
    get,
    path = "/secure/inventory/movements",
    params(MovementFilter),
    responses(
        (status = 200, description = "Movements returned", body = [inventory_movement::Model]),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    ctx: RequestContext,
    QueryParams(filter): QueryParams<MovementFilter>,
) -> Result<Response, ServiceError> {
    let movements = state.services.inventory.list_movements(&ctx, filter).await?;
    Ok(success_response(movements))
}

/// Alert-enabled products at or below their threshold
#[utoipa::path(
    get,
    path = "/secure/inventory/low-stock",
    responses(
        (status = 200, description = "Low stock products returned", body = [product::Model]),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, ServiceError> {
    let products = state.services.inventory.low_stock(&ctx).await?;
    Ok(success_response(products))
}
