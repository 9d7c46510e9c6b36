use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::entities::OrderStatus;
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::handlers::common::{HealthResponse, StatusResponse};
use crate::handlers::orders::{OrderListResponse, Pagination};
use crate::handlers::payment_webhooks::WebhookAck;
use crate::handlers::payments::VerifyPaymentRequest;
use crate::queries::{OrderStats, ProductRollup};
use crate::services::checkout::{CartItem, CheckoutRequest, CheckoutResponse};
use crate::services::orders::{OrderItemResponse, OrderResponse, ShippingAddressResponse};
use crate::services::verification::VerificationResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::common::health,
        handlers::common::status,
        handlers::checkout::create_checkout,
        handlers::payments::verify_payment,
        handlers::payment_webhooks::provider_webhook,
        handlers::orders::list_orders,
        handlers::orders::product_rollups,
    ),
    components(schemas(
        ErrorResponse,
        HealthResponse,
        StatusResponse,
        CartItem,
        CheckoutRequest,
        CheckoutResponse,
        VerifyPaymentRequest,
        VerificationResponse,
        OrderStatus,
        OrderResponse,
        OrderItemResponse,
        ShippingAddressResponse,
        OrderStats,
        ProductRollup,
        OrderListResponse,
        Pagination,
        WebhookAck,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Checkout session creation"),
        (name = "payments", description = "Payment verification and webhooks"),
        (name = "orders", description = "Order listing and reporting"),
        (name = "system", description = "Health and status"),
    ),
    info(
        title = "Storefront API",
        description = "Order lifecycle and payment reconciliation service",
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
