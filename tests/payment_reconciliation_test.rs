mod common;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::entities::{order, order_item, OrderStatus};

use common::{seed_pending_order, spawn_app};

fn paid_session(session_id: &str) -> Value {
    json!({
        "id": session_id,
        "object": "checkout.session",
        "payment_status": "paid",
        "payment_intent": "pi_verify",
        "amount_total": 5998,
        "currency": "usd",
        "customer_details": {"email": "buyer@example.com", "name": "Pat Doe"},
        "shipping_details": {
            "name": "Pat Doe",
            "address": {"line1": "1 Main St", "city": "Austin", "country": "US"}
        }
    })
}

async fn mock_session_retrieve(server: &MockServer, session_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/checkout/sessions/{}", session_id)))
        .and(header("authorization", "Bearer sk_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn verify_marks_a_pending_order_paid() {
    let stripe = MockServer::start().await;
    mock_session_retrieve(&stripe, "cs_v_1", paid_session("cs_v_1")).await;
    let app = spawn_app(&stripe.uri()).await;
    seed_pending_order(&app.state, "cs_v_1", 5998).await;

    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"session_id": "cs_v_1"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "paid");
    assert_eq!(body["order"]["status"], "paid");
    assert_eq!(body["order"]["amount_total"], 5998);
    assert_eq!(body["order"]["amount_display"], "$59.98");
    assert_eq!(body["order"]["customer_email"], "buyer@example.com");
    assert_eq!(body["order"]["shipping"]["city"], "Austin");
}

#[tokio::test]
async fn verify_accepts_the_camel_case_field_name() {
    let stripe = MockServer::start().await;
    mock_session_retrieve(&stripe, "cs_v_2", paid_session("cs_v_2")).await;
    let app = spawn_app(&stripe.uri()).await;
    seed_pending_order(&app.state, "cs_v_2", 5998).await;

    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"sessionId": "cs_v_2"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn unpaid_session_reports_failure_without_touching_the_order() {
    let stripe = MockServer::start().await;
    mock_session_retrieve(
        &stripe,
        "cs_v_3",
        json!({"id": "cs_v_3", "payment_status": "unpaid"}),
    )
    .await;
    let app = spawn_app(&stripe.uri()).await;
    seed_pending_order(&app.state, "cs_v_3", 5998).await;

    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"session_id": "cs_v_3"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "unpaid");
    assert_eq!(body["order"]["status"], "pending");

    let stored = order::Entity::find()
        .filter(order::Column::PaymentSessionId.eq("cs_v_3"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn verify_is_idempotent_for_an_already_paid_order() {
    let stripe = MockServer::start().await;
    mock_session_retrieve(&stripe, "cs_v_4", paid_session("cs_v_4")).await;
    let app = spawn_app(&stripe.uri()).await;
    seed_pending_order(&app.state, "cs_v_4", 5998).await;

    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/v1/payments/verify"))
            .json(&json!({"session_id": "cs_v_4"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["order"]["status"], "paid");
    }

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn orphaned_paid_session_is_backfilled() {
    let stripe = MockServer::start().await;
    mock_session_retrieve(&stripe, "cs_v_5", paid_session("cs_v_5")).await;
    let app = spawn_app(&stripe.uri()).await;

    // No local order exists for this session: the checkout write was lost.
    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"session_id": "cs_v_5"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["order"]["status"], "paid");
    assert_eq!(body["order"]["amount_total"], 5998);

    let backfilled = order::Entity::find()
        .filter(order::Column::PaymentSessionId.eq("cs_v_5"))
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("order backfilled");
    assert_eq!(backfilled.status, OrderStatus::Paid);
    assert_eq!(backfilled.payment_intent_id.as_deref(), Some("pi_verify"));

    // Line items cannot be reconstructed from the session.
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(backfilled.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn empty_session_id_is_a_bad_request() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;

    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"session_id": "  "}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn provider_outage_maps_to_bad_gateway() {
    let stripe = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/checkout/sessions/cs_v_6"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&stripe)
        .await;
    let app = spawn_app(&stripe.uri()).await;

    let response = app
        .client
        .post(app.url("/api/v1/payments/verify"))
        .json(&json!({"session_id": "cs_v_6"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
}
