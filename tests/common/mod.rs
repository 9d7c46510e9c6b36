use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use storefront_api::config::AppConfig;
use storefront_api::db::DbPool;
use storefront_api::migrator::Migrator;
use storefront_api::services::orders::{NewOrder, NewOrderItem};
use storefront_api::{app_router, AppState};

pub const STRIPE_KEY: &str = "sk_test_key";
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const ADMIN_TOKEN: &str = "admin-test-token";

pub fn test_config(stripe_api_base: &str) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "debug".into(),
        log_json: false,
        auto_migrate: false,
        cors_allowed_origins: None,
        cors_allow_any_origin: false,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_idle_timeout_secs: 60,
        db_acquire_timeout_secs: 5,
        stripe_secret_key: STRIPE_KEY.into(),
        stripe_api_base: stripe_api_base.into(),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        stripe_webhook_tolerance_secs: 300,
        site_url: "http://localhost:3000".into(),
        shipping_allowed_countries: "US,CA".into(),
        default_currency: "usd".into(),
        admin_api_token: Some(ADMIN_TOKEN.into()),
        event_channel_capacity: 64,
    }
}

/// Fresh in-memory database with the schema applied. A single connection is
/// used so every query sees the same in-memory database.
pub async fn test_db() -> DbPool {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("connect to in-memory database");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub state: AppState,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

/// Boots the full application against an in-memory database, with the
/// payment provider pointed at `stripe_api_base` (a mock server in tests).
pub async fn spawn_app(stripe_api_base: &str) -> TestApp {
    let db = Arc::new(test_db().await);
    let config = Arc::new(test_config(stripe_api_base));
    let state = AppState::new(db, config, None);

    let app = app_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let address = format!("http://{}", listener.local_addr().expect("local addr"));

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve test app");
    });

    TestApp {
        address,
        client: reqwest::Client::new(),
        state,
    }
}

/// Seeds a pending order directly through the service layer.
pub async fn seed_pending_order(
    state: &AppState,
    session_id: &str,
    amount_total: i64,
) -> storefront_api::entities::order::Model {
    state
        .services
        .orders
        .create_pending(NewOrder {
            payment_session_id: session_id.to_string(),
            amount_total,
            currency: "usd".into(),
            customer_email: None,
            items: vec![NewOrderItem {
                product_id: "prod_creatine".into(),
                product_name: "Creatine Monohydrate".into(),
                quantity: 2,
                price: amount_total / 2,
            }],
        })
        .await
        .expect("seed pending order")
}
