//! MBUY API Library
//!
//! Promotion ranking, inventory ledger, audit trail and analytics rollups for
//! the MBUY multi-tenant storefront backend.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::tracing::info;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service against one connection pool and event bus.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), config.ranking.clone());

        Self {
            db,
            config: Arc::new(config),
            event_sender,
            auth,
            services,
        }
    }
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            message: None,
            meta: ResponseMeta::capture(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
            message: Some(message.into()),
            meta: ResponseMeta::capture(),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Authenticated merchant surface, mounted under `/secure`.
pub fn secure_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/promotions",
            post(handlers::promotions::create_promotion).get(handlers::promotions::list_promotions),
        )
        .route(
            "/promotions/sweep",
            post(handlers::promotions::sweep_promotions),
        )
        .route("/promotions/:id", get(handlers::promotions::get_promotion))
        .route(
            "/promotions/:id/cancel",
            post(handlers::promotions::cancel_promotion),
        )
        .route("/inventory/adjust", post(handlers::inventory::adjust_stock))
        .route(
            "/inventory/movements",
            get(handlers::inventory::list_movements),
        )
        .route("/inventory/low-stock", get(handlers::inventory::low_stock))
        .route("/audit-logs", get(handlers::audit_logs::list_audit_logs))
        .route(
            "/analytics/summary",
            get(handlers::analytics::analytics_summary),
        )
        .route(
            "/analytics/top-products",
            get(handlers::analytics::top_products),
        )
        .with_auth()
}

/// Anonymous storefront and operational routes.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/status", get(handlers::health::status))
        .route("/stores", get(handlers::catalog::list_stores))
        .route(
            "/stores/:store_id/products",
            get(handlers::catalog::list_store_products),
        )
}

/// Full application router with the shared middleware stack. CORS is left to the binary.
pub fn app_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let auth = state.auth.clone();
    info!("Building application router");

    Router::new()
        .merge(public_routes())
        .nest("/secure", secure_routes())
        .with_state(state)
        .merge(openapi::swagger_ui())
        .layer(axum::middleware::from_fn(
            middleware_helpers::sanitize::body_limit_middleware,
        ))
        .layer(TimeoutLayer::new(timeout))
        .layer(CompressionLayer::new())
        .layer(crate::tracing::configure_http_tracing())
        .layer(Extension(auth))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
}
