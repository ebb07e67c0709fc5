use super::common::success_response;
use crate::{
    entities::{product, store},
    errors::{ErrorResponse, ServiceError},
    handlers::AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
};
use uuid::Uuid;

/// Active stores, promoted ones first
#[utoipa::path(
    get,
    path = "/stores",
    responses(
        (status = 200, description = "Stores in ranked order; promoted entries carry a `promotion` tag", body = [store::Model]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn list_stores(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let stores = state.services.catalog.list_stores().await?;
    Ok(success_response(stores))
}

/// Active products of one store, promoted ones first
#[utoipa::path(
    get,
    path = "/stores/{store_id}/products",
    params(("store_id" = Uuid, Path, description = "Store ID")),
    responses(
        (status = 200, description = "Products in ranked order; promoted entries carry a `promotion` tag", body = [product::Model]),
        (status = 404, description = "Store not found or inactive", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn list_store_products(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let products = state.services.catalog.list_store_products(store_id).await?;
    Ok(success_response(products))
}
