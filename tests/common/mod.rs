#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use http_body_util::BodyExt;
use mbuy_api::{
    app_router,
    auth::{AuthService, RequestContext},
    config::AppConfig,
    db,
    entities::{
        analytics_daily_rollup,
        promotion::{self, PromoType, PromotionStatus, TargetType},
        product, store,
    },
    events::{Event, EventSender},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub merchant_id: Uuid,
    pub actor_id: Uuid,
    token: String,
    auth_service: Arc<AuthService>,
    events: Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(1024);
        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        let auth_service = state.auth.clone();

        let merchant_id = Uuid::new_v4();
        let actor_id = Uuid::new_v4();
        let token = auth_service
            .issue_token(actor_id, Some(merchant_id), vec!["merchant".to_string()])
            .expect("issue test token");

        Self {
            router: app_router(state.clone()),
            state,
            merchant_id,
            actor_id,
            token,
            auth_service,
            events: Mutex::new(event_rx),
        }
    }

    /// Bearer token for the default merchant.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Token for another actor, optionally bound to a merchant.
    pub fn token_for(&self, merchant_id: Option<Uuid>) -> String {
        self.auth_service
            .issue_token(Uuid::new_v4(), merchant_id, vec![])
            .expect("issue test token")
    }

    /// Request context equivalent to [`TestApp::token`], for calling services directly.
    pub fn ctx(&self) -> RequestContext {
        RequestContext {
            actor_id: self.actor_id,
            merchant_id: self.merchant_id,
            roles: vec!["merchant".to_string()],
            request_id: None,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Authenticated request as the default merchant, returning status and parsed body.
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, Some(self.token())).await;
        read_json(response).await
    }

    /// Anonymous request, returning status and parsed body.
    pub async fn send_public(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = self.request(method, uri, None, None).await;
        read_json(response).await
    }

    /// Events published so far, in order.
    pub async fn drain_events(&self) -> Vec<Event> {
        let mut rx = self.events.lock().await;
        let mut drained = Vec::new();
        while let Ok(event) = rx.try_recv() {
            drained.push(event);
        }
        drained
    }

    pub async fn seed_store(&self, merchant_id: Uuid, name: &str) -> store::Model {
        self.seed_store_at(merchant_id, name, Utc::now()).await
    }

    pub async fn seed_store_at(
        &self,
        merchant_id: Uuid,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> store::Model {
        store::ActiveModel {
            id: Set(Uuid::new_v4()),
            merchant_id: Set(merchant_id),
            name: Set(name.to_string()),
            slug: Set(name.to_lowercase().replace(' ', "-")),
            is_active: Set(true),
            created_at: Set(created_at),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed store")
    }

    pub async fn seed_product(
        &self,
        store: &store::Model,
        name: &str,
        stock: i32,
        low_stock_threshold: i32,
    ) -> product::Model {
        self.seed_product_at(store, name, stock, low_stock_threshold, Utc::now())
            .await
    }

    pub async fn seed_product_at(
        &self,
        store: &store::Model,
        name: &str,
        stock: i32,
        low_stock_threshold: i32,
        created_at: DateTime<Utc>,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store.id),
            merchant_id: Set(store.merchant_id),
            name: Set(name.to_string()),
            price: Set(Decimal::new(1999, 2)),
            stock: Set(stock),
            low_stock_threshold: Set(low_stock_threshold),
            alert_enabled: Set(true),
            is_active: Set(true),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product")
    }

    /// Inserts a promotion row directly, bypassing creation-time validation.
    pub async fn seed_promotion(&self, seed: PromotionSeed) -> promotion::Model {
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            merchant_id: Set(seed.merchant_id),
            store_id: Set(seed.store_id),
            target_type: Set(seed.target_type),
            target_id: Set(seed.target_id),
            promo_type: Set(seed.promo_type),
            weight: Set(seed.weight),
            start_at: Set(seed.start_at),
            end_at: Set(seed.end_at),
            status: Set(seed.status),
            budget_points: Set(0),
            created_by: Set(Uuid::new_v4()),
            created_at: Set(seed.created_at.unwrap_or(now)),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed promotion")
    }

    pub async fn seed_rollup(
        &self,
        store_id: Uuid,
        product_id: Option<Uuid>,
        date: NaiveDate,
        views: i64,
        clicks: i64,
        orders: i64,
        revenue: Decimal,
    ) -> analytics_daily_rollup::Model {
        analytics_daily_rollup::ActiveModel {
            id: Set(Uuid::new_v4()),
            date: Set(date),
            store_id: Set(store_id),
            product_id: Set(product_id),
            views: Set(views),
            clicks: Set(clicks),
            orders: Set(orders),
            revenue: Set(revenue),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed rollup")
    }
}

/// Promotion row fields for [`TestApp::seed_promotion`].
pub struct PromotionSeed {
    pub merchant_id: Uuid,
    pub store_id: Uuid,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    pub promo_type: PromoType,
    pub weight: i32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: PromotionStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl PromotionSeed {
    /// A live promotion on one product, window around now.
    pub fn product(product: &product::Model, promo_type: PromoType, weight: i32) -> Self {
        let now = Utc::now();
        Self {
            merchant_id: product.merchant_id,
            store_id: product.store_id,
            target_type: TargetType::Product,
            target_id: Some(product.id),
            promo_type,
            weight,
            start_at: now - chrono::Duration::hours(1),
            end_at: now + chrono::Duration::hours(1),
            status: PromotionStatus::Active,
            created_at: None,
        }
    }

    /// A live promotion on a whole store.
    pub fn store(store: &store::Model, promo_type: PromoType, weight: i32) -> Self {
        let now = Utc::now();
        Self {
            merchant_id: store.merchant_id,
            store_id: store.id,
            target_type: TargetType::Store,
            target_id: None,
            promo_type,
            weight,
            start_at: now - chrono::Duration::hours(1),
            end_at: now + chrono::Duration::hours(1),
            status: PromotionStatus::Active,
            created_at: None,
        }
    }

    pub fn window(mut self, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        self.start_at = start_at;
        self.end_at = end_at;
        self
    }

    pub fn status(mut self, status: PromotionStatus) -> Self {
        self.status = status;
        self
    }
}

pub async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is json")
    };
    (status, value)
}
