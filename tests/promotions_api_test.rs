mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{PromotionSeed, TestApp};
use mbuy_api::{
    entities::promotion::{PromoType, PromotionStatus},
    events::Event,
};
use serde_json::json;
use uuid::Uuid;

fn window(start_offset_hours: i64, end_offset_hours: i64) -> (String, String) {
    let now = Utc::now();
    (
        (now + Duration::hours(start_offset_hours)).to_rfc3339(),
        (now + Duration::hours(end_offset_hours)).to_rfc3339(),
    )
}

#[tokio::test]
async fn creates_live_product_pin() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let product = app.seed_product(&store, "Mug", 10, 2).await;
    let (start_at, end_at) = window(-1, 24);

    let (status, body) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "product",
                "target_id": product.id,
                "promo_type": "pin",
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["store_id"], store.id.to_string());
    assert_eq!(body["data"]["weight"], 1);
    assert_eq!(body["data"]["budget_points"], 0);
    assert_eq!(body["data"]["created_by"], app.actor_id.to_string());
    assert!(body["meta"]["timestamp"].is_string());

    let events = app.drain_events().await;
    assert_matches!(events.as_slice(), [Event::PromotionCreated { merchant_id, .. }] if *merchant_id == app.merchant_id);
}

#[tokio::test]
async fn future_window_is_scheduled() {
    let app = TestApp::new().await;
    app.seed_store(app.merchant_id, "Corner Shop").await;
    let (start_at, end_at) = window(2, 24);

    let (status, body) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "store",
                "promo_type": "boost",
                "weight": 5,
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "scheduled");
    assert!(body["data"]["target_id"].is_null());
}

#[tokio::test]
async fn rejects_inverted_window() {
    let app = TestApp::new().await;
    app.seed_store(app.merchant_id, "Corner Shop").await;
    let (end_at, start_at) = window(1, 2);

    let (status, body) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "store",
                "promo_type": "pin",
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn rejects_target_mismatch() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let (start_at, end_at) = window(-1, 1);

    let (status, _) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "product",
                "promo_type": "pin",
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "store",
                "target_id": store.id,
                "promo_type": "pin",
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn product_of_another_merchant_is_not_found() {
    let app = TestApp::new().await;
    app.seed_store(app.merchant_id, "Mine").await;
    let theirs = app.seed_store(Uuid::new_v4(), "Theirs").await;
    let foreign = app.seed_product(&theirs, "Lamp", 5, 1).await;
    let (start_at, end_at) = window(-1, 1);

    let (status, body) = app
        .send(
            Method::POST,
            "/secure/promotions",
            Some(json!({
                "target_type": "product",
                "target_id": foreign.id,
                "promo_type": "boost",
                "start_at": start_at,
                "end_at": end_at,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn get_refreshes_stale_status() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let now = Utc::now();
    let stale = app
        .seed_promotion(
            PromotionSeed::store(&store, PromoType::Pin, 1)
                .window(now - Duration::hours(3), now - Duration::hours(1))
                .status(PromotionStatus::Active),
        )
        .await;

    let (status, body) = app
        .send(Method::GET, &format!("/secure/promotions/{}", stale.id), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "expired");

    let (_, listed) = app
        .send(Method::GET, "/secure/promotions?status=expired", None)
        .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn other_merchant_gets_forbidden() {
    let app = TestApp::new().await;
    let theirs = app.seed_store(Uuid::new_v4(), "Theirs").await;
    let promo = app
        .seed_promotion(PromotionSeed::store(&theirs, PromoType::Boost, 3))
        .await;

    let (status, body) = app
        .send(Method::GET, &format!("/secure/promotions/{}", promo.id), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/secure/promotions/{}/cancel", promo.id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/secure/promotions/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_is_one_way() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let promo = app
        .seed_promotion(PromotionSeed::store(&store, PromoType::Pin, 1))
        .await;
    let uri = format!("/secure/promotions/{}/cancel", promo.id);

    let (status, body) = app.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["message"], "Promotion cancelled");

    let (status, body) = app.send(Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_state");

    let (_, logs) = app
        .send(Method::GET, "/secure/audit-logs?entity_type=promotion", None)
        .await;
    let actions: Vec<&str> = logs["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["promotion.cancel"]);
}

#[tokio::test]
async fn expired_promotion_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let now = Utc::now();
    let promo = app
        .seed_promotion(
            PromotionSeed::store(&store, PromoType::Boost, 2)
                .window(now - Duration::days(2), now - Duration::days(1))
                .status(PromotionStatus::Scheduled),
        )
        .await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/secure/promotions/{}/cancel", promo.id),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Promotion is already expired");
}

#[tokio::test]
async fn sweep_persists_clock_transitions() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let now = Utc::now();

    app.seed_promotion(
        PromotionSeed::store(&store, PromoType::Pin, 1)
            .window(now - Duration::hours(1), now + Duration::hours(1))
            .status(PromotionStatus::Scheduled),
    )
    .await;
    app.seed_promotion(
        PromotionSeed::store(&store, PromoType::Boost, 1)
            .window(now - Duration::hours(5), now - Duration::hours(2))
            .status(PromotionStatus::Active),
    )
    .await;
    app.seed_promotion(
        PromotionSeed::store(&store, PromoType::Boost, 1)
            .window(now - Duration::hours(5), now - Duration::hours(2))
            .status(PromotionStatus::Cancelled),
    )
    .await;
    let theirs = app.seed_store(Uuid::new_v4(), "Theirs").await;
    app.seed_promotion(
        PromotionSeed::store(&theirs, PromoType::Boost, 1)
            .window(now - Duration::hours(5), now - Duration::hours(2))
            .status(PromotionStatus::Active),
    )
    .await;

    let (status, body) = app.send(Method::POST, "/secure/promotions/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activated"], 1);
    assert_eq!(body["data"]["expired"], 1);

    let (_, cancelled) = app
        .send(Method::GET, "/secure/promotions?status=cancelled", None)
        .await;
    assert_eq!(cancelled["data"].as_array().unwrap().len(), 1);

    let (_, again) = app.send(Method::POST, "/secure/promotions/sweep", None).await;
    assert_eq!(again["data"]["activated"], 0);
    assert_eq!(again["data"]["expired"], 0);
}

#[tokio::test]
async fn list_filters_by_type() {
    let app = TestApp::new().await;
    let store = app.seed_store(app.merchant_id, "Corner Shop").await;
    let product = app.seed_product(&store, "Mug", 10, 2).await;
    app.seed_promotion(PromotionSeed::store(&store, PromoType::Pin, 1))
        .await;
    app.seed_promotion(PromotionSeed::product(&product, PromoType::Boost, 4))
        .await;

    let (_, all) = app.send(Method::GET, "/secure/promotions", None).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);

    let (_, boosts) = app
        .send(Method::GET, "/secure/promotions?promo_type=boost", None)
        .await;
    let boosts = boosts["data"].as_array().unwrap();
    assert_eq!(boosts.len(), 1);
    assert_eq!(boosts[0]["target_id"], product.id.to_string());

    let (status, body) = app
        .send(Method::GET, "/secure/promotions?status=bogus", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}
