//! Client-side payment verification.
//!
//! The success page calls this with the session id from its redirect URL.
//! We re-query the provider rather than trusting the client, reconcile the
//! local order with what the provider reports, and backfill orders that
//! were never recorded locally.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::payments::{PaymentStatus, StripeClient};
use crate::services::orders::{OrderResponse, OrderService, PaymentConfirmation, Transition};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerificationResponse {
    /// Whether the provider confirmed the payment as settled.
    pub success: bool,
    /// Payment state the provider reported for the session.
    pub status: String,
    /// Local order for the session, when one exists.
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Clone)]
pub struct VerificationService {
    stripe: Arc<StripeClient>,
    orders: Arc<OrderService>,
}

impl VerificationService {
    pub fn new(stripe: Arc<StripeClient>, orders: Arc<OrderService>) -> Self {
        Self { stripe, orders }
    }

    /// Verifies a session against the provider and reconciles local state.
    ///
    /// Settled sessions move a pending order to paid; already-settled orders
    /// are left alone; sessions with no local order are backfilled as paid.
    #[instrument(skip(self))]
    pub async fn verify_session(
        &self,
        session_id: &str,
    ) -> Result<VerificationResponse, ServiceError> {
        if session_id.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "session_id is required".to_string(),
            ));
        }

        let session = self.stripe.retrieve_checkout_session(session_id).await?;
        let payment_status = payment_status_label(session.payment_status).to_string();

        if !session.is_paid() {
            info!(%session_id, %payment_status, "Session not settled");
            let order = match self.orders.find_by_session_id(session_id).await? {
                Some(order) => Some(self.orders.get_enriched(order).await?),
                None => None,
            };
            return Ok(VerificationResponse {
                success: false,
                status: payment_status,
                order,
            });
        }

        let confirmation = PaymentConfirmation::from_session(&session);
        let order = match self.orders.mark_paid(session_id, confirmation).await? {
            Transition::Applied(order) => {
                info!(order_id = %order.id, "Payment verified; order marked paid");
                order
            }
            Transition::AlreadyFinal(order) => {
                if order.status != OrderStatus::Paid {
                    // Provider says paid but a failure/expiry landed first.
                    // Terminal states are final, so report what we have.
                    warn!(
                        order_id = %order.id,
                        status = %order.status,
                        "Settled session conflicts with terminal order state"
                    );
                }
                order
            }
            Transition::NotFound => self.orders.backfill_from_session(&session).await?,
        };

        let enriched = self.orders.get_enriched(order).await?;
        Ok(VerificationResponse {
            success: true,
            status: payment_status,
            order: Some(enriched),
        })
    }
}

fn payment_status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Paid => "paid",
        PaymentStatus::Unpaid => "unpaid",
        PaymentStatus::NoPaymentRequired => "no_payment_required",
        PaymentStatus::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_labels_match_wire_values() {
        assert_eq!(payment_status_label(PaymentStatus::Paid), "paid");
        assert_eq!(payment_status_label(PaymentStatus::Unpaid), "unpaid");
        assert_eq!(
            payment_status_label(PaymentStatus::NoPaymentRequired),
            "no_payment_required"
        );
    }
}
