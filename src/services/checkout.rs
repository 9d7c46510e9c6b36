//! Checkout initiation.
//!
//! Validates the cart, creates a hosted checkout session with the payment
//! provider, and records a pending order keyed by the session id. If the
//! local write fails after the session was created, the buyer still gets
//! the checkout URL; reconciliation recovers the order later.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::payments::{CreateCheckoutSessionRequest, SessionLineItem, StripeClient};
use crate::services::orders::{NewOrder, NewOrderItem, OrderService};

/// One cart line as submitted by the storefront. Prices are decimal major
/// units (dollars) as displayed to the buyer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItem {
    #[validate(length(min = 1, message = "Product id must not be empty"))]
    pub id: String,
    #[validate(length(min = 1, message = "Product name must not be empty"))]
    pub name: String,
    /// Unit price in major units, e.g. 29.99
    #[schema(value_type = f64)]
    pub price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "Cart must not be empty"))]
    pub items: Vec<CartItem>,
    /// Optional buyer email forwarded to the pending order.
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// Hosted checkout URL to redirect the buyer to.
    pub url: String,
    pub session_id: String,
}

/// Converts a major-unit price to minor units, rounding half away from zero.
pub fn to_minor_units(price: Decimal) -> Result<i64, ServiceError> {
    (price * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("Price out of range".to_string()))
}

/// Computes the order total in minor units: sum of unit price times quantity
/// over every cart line.
pub fn cart_total_cents(items: &[CartItem]) -> Result<i64, ServiceError> {
    let mut total: i64 = 0;
    for item in items {
        let unit = to_minor_units(item.price)?;
        let line = unit
            .checked_mul(item.quantity as i64)
            .ok_or_else(|| ServiceError::ValidationError("Cart total overflow".to_string()))?;
        total = total
            .checked_add(line)
            .ok_or_else(|| ServiceError::ValidationError("Cart total overflow".to_string()))?;
    }
    Ok(total)
}

#[derive(Debug, Clone)]
pub struct CheckoutService {
    stripe: Arc<StripeClient>,
    orders: Arc<OrderService>,
    currency: String,
    success_url: String,
    cancel_url: String,
    allowed_countries: Vec<String>,
}

impl CheckoutService {
    pub fn new(
        stripe: Arc<StripeClient>,
        orders: Arc<OrderService>,
        currency: String,
        success_url: String,
        cancel_url: String,
        allowed_countries: Vec<String>,
    ) -> Self {
        Self {
            stripe,
            orders,
            currency,
            success_url,
            cancel_url,
            allowed_countries,
        }
    }

    /// Creates a checkout session for the cart and records a pending order.
    ///
    /// The checkout URL is returned even when recording the order fails;
    /// losing the sale is worse than a temporarily missing row, which the
    /// verification path backfills.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
            if item.price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price must not be negative".to_string(),
                ));
            }
        }

        let amount_total = cart_total_cents(&request.items)?;

        let mut line_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            line_items.push(SessionLineItem {
                name: item.name.clone(),
                unit_amount: to_minor_units(item.price)?,
                quantity: item.quantity as i64,
            });
        }

        let session = self
            .stripe
            .create_checkout_session(&CreateCheckoutSessionRequest {
                line_items,
                currency: self.currency.clone(),
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
                allowed_countries: self.allowed_countries.clone(),
            })
            .await?;

        let url = session.url.clone().ok_or_else(|| {
            ServiceError::PaymentProviderError("session has no checkout URL".to_string())
        })?;

        let new_order = NewOrder {
            payment_session_id: session.id.clone(),
            amount_total,
            currency: self.currency.clone(),
            customer_email: request.customer_email,
            items: request
                .items
                .iter()
                .map(|item| {
                    Ok(NewOrderItem {
                        product_id: item.id.clone(),
                        product_name: item.name.clone(),
                        quantity: item.quantity,
                        price: to_minor_units(item.price)?,
                    })
                })
                .collect::<Result<Vec<_>, ServiceError>>()?,
        };

        if let Err(e) = self.orders.create_pending(new_order).await {
            error!(
                session_id = %session.id,
                "Failed to record pending order; returning checkout URL anyway: {}",
                e
            );
        } else {
            info!(session_id = %session.id, amount_total, "Checkout session created");
        }

        Ok(CheckoutResponse {
            url,
            session_id: session.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, quantity: i32) -> CartItem {
        CartItem {
            id: "prod_1".into(),
            name: "Creatine".into(),
            price,
            quantity,
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let items = vec![item(dec!(29.99), 2), item(dec!(45.99), 1)];
        assert_eq!(cart_total_cents(&items).unwrap(), 2999 * 2 + 4599);
    }

    #[test]
    fn sub_cent_prices_round_to_nearest_cent() {
        assert_eq!(to_minor_units(dec!(0.105)).unwrap(), 11);
        assert_eq!(to_minor_units(dec!(19.999)).unwrap(), 2000);
    }

    #[test]
    fn overflow_is_rejected() {
        let items = vec![item(Decimal::from(i64::MAX / 50), 100)];
        assert!(cart_total_cents(&items).is_err());
    }

    #[test]
    fn empty_cart_fails_validation() {
        let request = CheckoutRequest {
            items: vec![],
            customer_email: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn zero_quantity_fails_validation() {
        assert!(item(dec!(10.00), 0).validate().is_err());
        assert!(item(dec!(10.00), 1).validate().is_ok());
    }
}
