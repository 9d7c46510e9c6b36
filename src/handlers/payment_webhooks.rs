//! Inbound webhook endpoint for payment provider events.
//!
//! The raw body must be read before any JSON parsing because the signature
//! covers the exact bytes on the wire. Deliveries that fail the signature
//! check are rejected without touching any order state.

use axum::extract::State;
use bytes::Bytes;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::errors::{ErrorResponse, ServiceError};
use crate::events::Event;
use crate::payments::signature::{self, SIGNATURE_HEADER};
use crate::payments::WebhookEvent;
use crate::services::orders::{PaymentConfirmation, Transition};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

/// Receives signed provider events and applies order transitions.
///
/// Always acknowledges verified deliveries, including redeliveries for
/// already-settled orders and events for unknown sessions; a non-2xx would
/// only make the provider retry a delivery we cannot act on.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "payments",
    request_body = Vec<u8>,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed event payload", body = ErrorResponse),
        (status = 401, description = "Signature verification failed", body = ErrorResponse)
    )
)]
pub async fn provider_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    let Some(secret) = state.config.stripe_webhook_secret.as_deref() else {
        error!("Webhook received but no webhook secret is configured");
        return Err(ServiceError::InternalError(
            "webhook secret not configured".to_string(),
        ));
    };

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("Missing signature header".to_string()))?;

    if !signature::verify(
        &body,
        header,
        secret,
        state.config.stripe_webhook_tolerance_secs,
    ) {
        warn!("Webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("Malformed event payload: {}", e)))?;

    info!(event_id = %event.id, event_type = %event.event_type, "Webhook received");

    let session = &event.data.object;
    let transition = match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => Some(
            state
                .services
                .orders
                .mark_paid(&session.id, PaymentConfirmation::from_session(session))
                .await?,
        ),
        "checkout.session.async_payment_failed" => {
            Some(state.services.orders.mark_failed(&session.id).await?)
        }
        "checkout.session.expired" => {
            Some(state.services.orders.mark_expired(&session.id).await?)
        }
        other => {
            debug!(event_type = %other, "Ignoring unhandled event type");
            None
        }
    };

    match transition {
        Some(Transition::Applied(order)) => {
            info!(order_id = %order.id, status = %order.status, "Webhook applied transition");
        }
        Some(Transition::AlreadyFinal(order)) => {
            info!(order_id = %order.id, status = %order.status, "Webhook redelivery ignored");
        }
        Some(Transition::NotFound) => {
            warn!(session_id = %session.id, "Webhook for unknown session acknowledged");
        }
        None => {}
    }

    if let Some(sender) = &state.event_sender {
        if let Err(e) = sender
            .send(Event::WebhookProcessed {
                event_type: event.event_type.clone(),
            })
            .await
        {
            error!("Failed to send event: {}", e);
        }
    }

    Ok(Json(WebhookAck { received: true }))
}
