use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MBUY API",
        version = "1.0.0",
        description = r#"
# MBUY Storefront API

Merchant tooling and public listings for the MBUY marketplace.

## Features

- **Promotions**: time-boxed PIN and BOOST placements for stores and products
- **Ranking**: public listings ordered by live promotions
- **Inventory**: stock ledger with low-stock alerts
- **Audit**: append-only trail of merchant actions
- **Analytics**: daily rollups of views, clicks, orders and revenue

## Authentication

Routes under `/secure` require a bearer token carrying a `merchant_id` claim:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Failures share one envelope:

```json
{
  "ok": false,
  "error": "not_found",
  "message": "Promotion not found",
  "request_id": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "promotions", description = "Promotion management"),
        (name = "inventory", description = "Stock adjustments and ledger"),
        (name = "audit", description = "Audit trail"),
        (name = "analytics", description = "Merchant dashboards"),
        (name = "catalog", description = "Public ranked listings"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::promotions::create_promotion,
        crate::handlers::promotions::list_promotions,
        crate::handlers::promotions::get_promotion,
        crate::handlers::promotions::cancel_promotion,
        crate::handlers::promotions::sweep_promotions,

        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::low_stock,

        crate::handlers::audit_logs::list_audit_logs,

        crate::handlers::analytics::analytics_summary,
        crate::handlers::analytics::top_products,

        crate::handlers::catalog::list_stores,
        crate::handlers::catalog::list_store_products,

        crate::handlers::health::health,
        crate::handlers::health::status,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,
            crate::errors::ErrorResponse,

            crate::entities::store::Model,
            crate::entities::product::Model,
            crate::entities::promotion::Model,
            crate::entities::promotion::TargetType,
            crate::entities::promotion::PromoType,
            crate::entities::promotion::PromotionStatus,
            crate::entities::inventory_movement::Model,
            crate::entities::inventory_movement::MovementReason,
            crate::entities::audit_log::Model,
            crate::entities::audit_log::Severity,

            crate::services::promotions::CreatePromotionRequest,
            crate::services::promotions::SweepSummary,
            crate::services::inventory::AdjustStockRequest,
            crate::services::inventory::AdjustmentOutcome,
            crate::services::analytics::AnalyticsSummary,
            crate::services::analytics::DailyTotals,
            crate::services::analytics::TopProduct,
            crate::handlers::health::HealthStatus,
            crate::handlers::health::ServiceStatus,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
