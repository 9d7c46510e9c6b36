//! Payment provider integration: hosted-checkout session client and
//! webhook signature verification.

pub mod provider;
pub mod signature;

pub use provider::{
    CheckoutSession, CreateCheckoutSessionRequest, CustomerDetails, PaymentStatus,
    SessionLineItem, ShippingDetails, StripeAddress, StripeClient, WebhookEvent,
};
