use super::common::{created_response, message_response, success_response, QueryParams, ValidatedJson};
use crate::{
    auth::RequestContext,
    entities::promotion,
    errors::{ErrorResponse, ServiceError},
    handlers::AppState,
    services::promotions::{CreatePromotionRequest, PromotionFilter, SweepSummary},
};
use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

/// Create a promotion for the caller's merchant
#[utoipa::path(
    post,
    path = "/secure/promotions",
    request_body = CreatePromotionRequest,
    responses(
        (status = 201, description = "Promotion created", body = promotion::Model,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse),
        (status = 404, description = "Target not found for this merchant", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "promotions"
)]
pub async fn create_promotion(
    State(state): State<AppState>,
    ctx: RequestContext,
    ValidatedJson(payload): ValidatedJson<CreatePromotionRequest>,
) -> Result<Response, ServiceError> {
    let created = state.services.promotions.create(&ctx, payload).await?;
    Ok(created_response(created))
}

/// List the caller's promotions, newest first
#[utoipa::path(
    get,
    path = "/secure/promotions",
    params(PromotionFilter),
    responses(
        (status = 200, description = "Promotions returned", body = [promotion::Model]),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "promotions"
)]
pub async fn list_promotions(
    State(state): State<AppState>,
    ctx: RequestContext,
    QueryParams(filter): QueryParams<PromotionFilter>,
) -> Result<Response, ServiceError> {
    let promotions = state.services.promotions.list(&ctx, filter).await?;
    Ok(success_response(promotions))
}

/// Fetch one promotion with its status refreshed against the clock
#[utoipa::path(
    get,
    path = "/secure/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion ID")),
    responses(
        (status = 200, description = "Promotion returned", body = promotion::Model),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Owned by another merchant", body = ErrorResponse),
        (status = 404, description = "Promotion not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "promotions"
)]
pub async fn get_promotion(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let found = state.services.promotions.get(&ctx, id).await?;
    Ok(success_response(found))
}

/// Cancel a scheduled or active promotion
#[utoipa::path(
    post,
    path = "/secure/promotions/{id}/cancel",
    params(("id" = Uuid, Path, description = "Promotion ID")),
    responses(
        (status = 200, description = "Promotion cancelled", body = promotion::Model),
        (status = 400, description = "Promotion already expired or cancelled", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Owned by another merchant", body = ErrorResponse),
        (status = 404, description = "Promotion not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "promotions"
)]
pub async fn cancel_promotion(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let cancelled = state.services.promotions.cancel(&ctx, id).await?;
    Ok(message_response(cancelled, "Promotion cancelled"))
}

/// Persist status transitions that the clock has already made
#[utoipa::path(
    post,
    path = "/secure/promotions/sweep",
    responses(
        (status = 200, description = "Statuses refreshed", body = SweepSummary),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "promotions"
)]
pub async fn sweep_promotions(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, ServiceError> {
    let summary = state.services.promotions.sweep(&ctx, Utc::now()).await?;
    Ok(success_response(summary))
}
