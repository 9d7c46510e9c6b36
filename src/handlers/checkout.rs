use axum::extract::State;
use axum::Json;

use crate::errors::{ErrorResponse, ServiceError};
use crate::services::checkout::{CheckoutRequest, CheckoutResponse};
use crate::AppState;

/// Creates a hosted checkout session for the submitted cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    tag = "checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Invalid cart", body = ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = ErrorResponse)
    )
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let response = state.services.checkout.create_checkout(request).await?;
    Ok(Json(response))
}
