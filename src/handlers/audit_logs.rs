use super::common::{success_response, QueryParams};
use crate::{
    auth::RequestContext,
    entities::audit_log,
    errors::{ErrorResponse, ServiceError},
    handlers::AppState,
    services::audit::AuditLogFilter,
};
use axum::{extract::State, response::Response};

/// Audit trail of the caller's merchant, newest first
#[utoipa::path(
    get,
    path = "/secure/audit-logs",
    params(AuditLogFilter),
    responses(
        (status = 200, description = "Audit entries returned", body = [audit_log::Model]),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Token carries no merchant", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "audit"
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    ctx: RequestContext,
    QueryParams(filter): QueryParams<AuditLogFilter>,
) -> Result<Response, ServiceError> {
    let entries = state.services.audit.list(&ctx, filter).await?;
    Ok(success_response(entries))
}
