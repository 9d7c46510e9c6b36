//! HTTP client for the payment provider's hosted-checkout API.
//!
//! The provider exposes a form-encoded REST API. We only use two calls:
//! creating a checkout session and retrieving one by id.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::errors::ServiceError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Line item for a new checkout session. Amounts are minor units (cents).
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

/// Parameters for creating a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub allowed_countries: Vec<String>,
}

/// Payment state the provider reports for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StripeAddress {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ShippingDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<StripeAddress>,
}

/// Checkout session object as returned by the provider. Only the fields we
/// consume are modeled; everything else is ignored on deserialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub shipping_details: Option<ShippingDetails>,
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Unknown
}

impl CheckoutSession {
    /// Whether the provider considers this session settled.
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

/// Webhook event envelope. Every event type we handle carries a checkout
/// session as `data.object`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: CheckoutSession,
}

/// Client for the payment provider API.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    /// Creates a hosted checkout session and returns it, including the
    /// redirect URL the buyer should be sent to.
    #[instrument(skip(self, req), fields(line_items = req.line_items.len()))]
    pub async fn create_checkout_session(
        &self,
        req: &CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let params = session_form_params(req);

        debug!(%url, "Creating checkout session");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Checkout session request failed: {}", e);
                ServiceError::PaymentProviderError(format!("session create request failed: {}", e))
            })?;

        Self::parse_session_response(response).await
    }

    /// Retrieves an existing checkout session by id.
    #[instrument(skip(self))]
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let url = format!("{}/v1/checkout/sessions/{}", self.api_base, session_id);

        debug!(%url, "Retrieving checkout session");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!("Checkout session retrieval failed: {}", e);
                ServiceError::PaymentProviderError(format!(
                    "session retrieve request failed: {}",
                    e
                ))
            })?;

        Self::parse_session_response(response).await
    }

    async fn parse_session_response(
        response: reqwest::Response,
    ) -> Result<CheckoutSession, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Payment provider returned an error: {}", body);
            return Err(ServiceError::PaymentProviderError(format!(
                "provider returned HTTP {}",
                status
            )));
        }

        response.json::<CheckoutSession>().await.map_err(|e| {
            error!("Failed to decode checkout session: {}", e);
            ServiceError::PaymentProviderError(format!("invalid session payload: {}", e))
        })
    }
}

/// Flattens a session request into the provider's bracketed form encoding.
fn session_form_params(req: &CreateCheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), req.success_url.clone()),
        ("cancel_url".to_string(), req.cancel_url.clone()),
        (
            "payment_method_types[0]".to_string(),
            "card".to_string(),
        ),
    ];

    for (i, country) in req.allowed_countries.iter().enumerate() {
        params.push((
            format!("shipping_address_collection[allowed_countries][{}]", i),
            country.clone(),
        ));
    }

    for (i, item) in req.line_items.iter().enumerate() {
        params.push((
            format!("line_items[{}][price_data][currency]", i),
            req.currency.clone(),
        ));
        params.push((
            format!("line_items[{}][price_data][product_data][name]", i),
            item.name.clone(),
        ));
        params.push((
            format!("line_items[{}][price_data][unit_amount]", i),
            item.unit_amount.to_string(),
        ));
        params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CreateCheckoutSessionRequest {
        CreateCheckoutSessionRequest {
            line_items: vec![
                SessionLineItem {
                    name: "Creatine Monohydrate".into(),
                    unit_amount: 2999,
                    quantity: 2,
                },
                SessionLineItem {
                    name: "Whey Protein".into(),
                    unit_amount: 4599,
                    quantity: 1,
                },
            ],
            currency: "usd".into(),
            success_url: "https://shop.test/success?session_id={CHECKOUT_SESSION_ID}".into(),
            cancel_url: "https://shop.test/buy?canceled=true".into(),
            allowed_countries: vec!["US".into(), "CA".into()],
        }
    }

    #[test]
    fn form_params_cover_all_line_items() {
        let params = session_form_params(&sample_request());

        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("payment_method_types[0]"), Some("card"));
        assert_eq!(
            get("shipping_address_collection[allowed_countries][1]"),
            Some("CA")
        );
        assert_eq!(
            get("line_items[0][price_data][product_data][name]"),
            Some("Creatine Monohydrate")
        );
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("2999"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("line_items[1][price_data][unit_amount]"), Some("4599"));
        assert_eq!(get("line_items[1][price_data][currency]"), Some("usd"));
    }

    #[test]
    fn session_deserializes_with_minimal_fields() {
        let json = r#"{"id":"cs_test_123","payment_status":"unpaid"}"#;
        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, "cs_test_123");
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        assert!(session.url.is_none());
        assert!(!session.is_paid());
    }

    #[test]
    fn session_deserializes_full_shape() {
        let json = r#"{
            "id": "cs_test_456",
            "url": "https://checkout.test/pay/cs_test_456",
            "payment_status": "paid",
            "payment_intent": "pi_789",
            "amount_total": 10597,
            "currency": "usd",
            "customer_details": {"email": "buyer@example.com", "name": "Pat Doe"},
            "shipping_details": {
                "name": "Pat Doe",
                "address": {
                    "line1": "1 Main St",
                    "city": "Austin",
                    "state": "TX",
                    "postal_code": "78701",
                    "country": "US"
                }
            },
            "object": "checkout.session",
            "livemode": false
        }"#;
        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert!(session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_789"));
        assert_eq!(session.amount_total, Some(10597));
        let shipping = session.shipping_details.unwrap();
        assert_eq!(shipping.address.unwrap().city.as_deref(), Some("Austin"));
    }

    #[test]
    fn unknown_payment_status_does_not_fail_decoding() {
        let json = r#"{"id":"cs_x","payment_status":"something_new"}"#;
        let session: CheckoutSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.payment_status, PaymentStatus::Unknown);
    }

    #[test]
    fn webhook_event_envelope_decodes() {
        let json = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_123", "payment_status": "paid"}}
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object.id, "cs_test_123");
    }
}
