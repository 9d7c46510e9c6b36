mod common;

use serde_json::Value;
use wiremock::MockServer;

use storefront_api::services::orders::PaymentConfirmation;

use common::{seed_pending_order, spawn_app, TestApp, ADMIN_TOKEN};

async fn seed_orders(app: &TestApp) {
    // Three orders: two paid, one left pending.
    for (session, amount) in [("cs_r_1", 5998), ("cs_r_2", 4599), ("cs_r_3", 2999)] {
        seed_pending_order(&app.state, session, amount).await;
    }
    for session in ["cs_r_1", "cs_r_2"] {
        app.state
            .services
            .orders
            .mark_paid(session, PaymentConfirmation::default())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn listing_requires_the_admin_token() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;

    let no_token = app
        .client
        .get(app.url("/api/v1/orders"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_token.status(), 401);

    let bad_token = app
        .client
        .get(app.url("/api/v1/orders"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_token.status(), 401);

    let good = app
        .client
        .get(app.url("/api/v1/orders"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(good.status(), 200);
}

#[tokio::test]
async fn listing_returns_enriched_orders_and_stats() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;
    seed_orders(&app).await;

    let response = app
        .client
        .get(app.url("/api/v1/orders"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 3);
    for order in orders {
        assert!(order["amount_display"].as_str().unwrap().starts_with('$'));
        assert_eq!(order["items"].as_array().unwrap().len(), 1);
    }

    assert_eq!(body["stats"]["total_orders"], 3);
    assert_eq!(body["stats"]["paid_orders"], 2);
    assert_eq!(body["stats"]["total_revenue"], 5998 + 4599);
    assert_eq!(body["stats"]["total_revenue_display"], "$105.97");
    assert_eq!(body["stats"]["recent_orders"], 3);
}

#[tokio::test]
async fn pagination_reports_has_more() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;
    seed_orders(&app).await;

    let first_page = app
        .client
        .get(app.url("/api/v1/orders?limit=2&offset=0"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    let body: Value = first_page.json().await.unwrap();
    assert_eq!(body["orders"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["has_more"], true);

    let last_page = app
        .client
        .get(app.url("/api/v1/orders?limit=2&offset=2"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    let body: Value = last_page.json().await.unwrap();
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["has_more"], false);
}

#[tokio::test]
async fn rollups_cover_only_paid_orders() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;
    seed_orders(&app).await;

    let response = app
        .client
        .get(app.url("/api/v1/orders/rollups"))
        .bearer_auth(ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let rollups: Value = response.json().await.unwrap();
    let rollups = rollups.as_array().unwrap();
    assert_eq!(rollups.len(), 1);

    // Every seeded order carries two units of the same product; only the
    // two paid orders count.
    let rollup = &rollups[0];
    assert_eq!(rollup["product_id"], "prod_creatine");
    assert_eq!(rollup["units_sold"], 4);
    assert_eq!(rollup["revenue"], 5998 + 4598);
    assert_eq!(
        rollup["revenue_display"],
        format!("${}.{:02}", (5998 + 4598) / 100, (5998 + 4598) % 100)
    );
}

#[tokio::test]
async fn health_and_status_respond() {
    let stripe = MockServer::start().await;
    let app = spawn_app(&stripe.uri()).await;

    let health = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "up");

    let status = app.client.get(app.url("/status")).send().await.unwrap();
    assert_eq!(status.status(), 200);
    let body: Value = status.json().await.unwrap();
    assert_eq!(body["name"], "storefront-api");
    assert_eq!(body["environment"], "development");
}
