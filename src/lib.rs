pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod payments;
pub mod queries;
pub mod services;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::payments::StripeClient;
use crate::services::{CheckoutService, OrderService, VerificationService};

/// Service instances shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub verification: Arc<VerificationService>,
}

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: Option<Arc<EventSender>>,
    pub services: AppServices,
}

impl AppState {
    /// Wires up the service graph from a connection pool and configuration.
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let stripe = Arc::new(StripeClient::new(
            config.stripe_secret_key.clone(),
            config.stripe_api_base.clone(),
        ));

        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            stripe.clone(),
            orders.clone(),
            config.default_currency.clone(),
            config.checkout_success_url(),
            config.checkout_cancel_url(),
            config.shipping_countries(),
        ));
        let verification = Arc::new(VerificationService::new(stripe, orders.clone()));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                orders,
                checkout,
                verification,
            },
        }
    }
}

/// Versioned API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::provider_webhook),
        )
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/rollups", get(handlers::orders::product_rollups))
}

/// Full application router including system endpoints and API docs.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::common::health))
        .route("/status", get(handlers::common::status))
        .nest("/api/v1", api_v1_routes())
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .with_state(state)
}
