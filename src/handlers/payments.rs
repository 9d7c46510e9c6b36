use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::{ErrorResponse, ServiceError};
use crate::services::verification::VerificationResponse;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    /// Checkout session id from the success redirect.
    #[serde(alias = "sessionId")]
    pub session_id: String,
}

/// Re-queries the payment provider for a session and reconciles the local
/// order with the provider's answer.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    tag = "payments",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification result", body = VerificationResponse),
        (status = 400, description = "Missing session id", body = ErrorResponse),
        (status = 502, description = "Payment provider unavailable", body = ErrorResponse)
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerificationResponse>, ServiceError> {
    let response = state
        .services
        .verification
        .verify_session(&request.session_id)
        .await?;
    Ok(Json(response))
}
