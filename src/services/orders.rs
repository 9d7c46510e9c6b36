//! Order lifecycle service.
//!
//! Owns every write to the orders tables. Status transitions are applied as
//! single conditional UPDATEs filtered on the pending state, so concurrent
//! webhook deliveries and verification calls cannot double-apply a
//! transition or overwrite a terminal state.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{order, order_item, shipping_address, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::payments::CheckoutSession;

/// Formats minor units as a display string, e.g. `12345` -> `"$123.45"`.
pub fn format_amount_display(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

/// New order to record for a freshly created checkout session.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub payment_session_id: String,
    pub amount_total: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub price: i64,
}

/// Details captured when a payment is confirmed.
#[derive(Debug, Clone, Default)]
pub struct PaymentConfirmation {
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub shipping: Option<ShippingInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct ShippingInfo {
    pub name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PaymentConfirmation {
    /// Extracts confirmation details from a provider session.
    pub fn from_session(session: &CheckoutSession) -> Self {
        let (customer_email, customer_name) = session
            .customer_details
            .as_ref()
            .map(|c| (c.email.clone(), c.name.clone()))
            .unwrap_or_default();

        let shipping = session.shipping_details.as_ref().map(|s| {
            let address = s.address.clone().unwrap_or_default();
            ShippingInfo {
                name: s.name.clone(),
                line1: address.line1,
                line2: address.line2,
                city: address.city,
                state: address.state,
                postal_code: address.postal_code,
                country: address.country,
            }
        });

        Self {
            payment_intent_id: session.payment_intent.clone(),
            customer_email,
            customer_name,
            shipping,
        }
    }
}

/// Result of attempting a status transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The order moved from pending to the requested state.
    Applied(order::Model),
    /// The order was already in a terminal state; nothing changed.
    AlreadyFinal(order::Model),
    /// No order exists for the session id.
    NotFound,
}

/// Order line item as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    /// Unit price in minor currency units.
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddressResponse {
    pub name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Order as returned by the API, enriched with items and shipping.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub payment_session_id: String,
    pub status: OrderStatus,
    /// Total in minor currency units.
    pub amount_total: i64,
    /// Human-readable total, e.g. "$45.99".
    pub amount_display: String,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    pub shipping: Option<ShippingAddressResponse>,
}

impl OrderResponse {
    pub fn from_parts(
        order: order::Model,
        items: Vec<order_item::Model>,
        shipping: Option<shipping_address::Model>,
    ) -> Self {
        Self {
            id: order.id,
            payment_session_id: order.payment_session_id,
            status: order.status,
            amount_total: order.amount_total,
            amount_display: format_amount_display(order.amount_total),
            currency: order.currency,
            customer_email: order.customer_email,
            customer_name: order.customer_name,
            created_at: order.created_at,
            items: items
                .into_iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id,
                    product_name: i.product_name,
                    quantity: i.quantity,
                    price: i.price,
                })
                .collect(),
            shipping: shipping.map(|s| ShippingAddressResponse {
                name: s.name,
                line1: s.line1,
                line2: s.line2,
                city: s.city,
                state: s.state,
                postal_code: s.postal_code,
                country: s.country,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    async fn send_event(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                error!("Failed to send event: {}", e);
            }
        }
    }

    /// Records a pending order and its line items in one transaction.
    ///
    /// The session id carries a unique constraint, so recording the same
    /// session twice fails with a conflict rather than a duplicate order.
    #[instrument(skip(self, new_order), fields(session_id = %new_order.payment_session_id))]
    pub async fn create_pending(&self, new_order: NewOrder) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            payment_session_id: Set(new_order.payment_session_id),
            payment_intent_id: Set(None),
            customer_email: Set(new_order.customer_email),
            customer_name: Set(None),
            amount_total: Set(new_order.amount_total),
            currency: Set(new_order.currency),
            status: Set(OrderStatus::Pending),
            ..Default::default()
        };

        let model = order.insert(&txn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                ServiceError::Conflict("An order already exists for this session".to_string())
            } else {
                ServiceError::DatabaseError(e)
            }
        })?;

        let now = Utc::now();
        for item in new_order.items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                product_name: Set(item.product_name),
                quantity: Set(item.quantity),
                price: Set(item.price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(%order_id, "Recorded pending order");
        self.send_event(Event::OrderCreated(order_id)).await;

        Ok(model)
    }

    pub async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::PaymentSessionId.eq(session_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Loads an order with its items and shipping address.
    pub async fn get_enriched(&self, order: order::Model) -> Result<OrderResponse, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let shipping = shipping_address::Entity::find()
            .filter(shipping_address::Column::OrderId.eq(order.id))
            .one(&*self.db)
            .await?;

        Ok(OrderResponse::from_parts(order, items, shipping))
    }

    /// Marks the order for `session_id` as paid, recording payment and
    /// customer details. Idempotent: a terminal order is left untouched.
    #[instrument(skip(self, confirmation))]
    pub async fn mark_paid(
        &self,
        session_id: &str,
        confirmation: PaymentConfirmation,
    ) -> Result<Transition, ServiceError> {
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Paid))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));

        if let Some(intent) = &confirmation.payment_intent_id {
            update = update.col_expr(order::Column::PaymentIntentId, Expr::value(intent.clone()));
        }
        if let Some(email) = &confirmation.customer_email {
            update = update.col_expr(order::Column::CustomerEmail, Expr::value(email.clone()));
        }
        if let Some(name) = &confirmation.customer_name {
            update = update.col_expr(order::Column::CustomerName, Expr::value(name.clone()));
        }

        let result = update
            .filter(order::Column::PaymentSessionId.eq(session_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        let transition = self
            .resolve_transition(session_id, OrderStatus::Paid, result.rows_affected)
            .await?;

        // Shipping is recorded for the order regardless of which caller won
        // the transition race; the unique key keeps the first write.
        if let (Transition::Applied(order) | Transition::AlreadyFinal(order), Some(shipping)) =
            (&transition, confirmation.shipping)
        {
            self.attach_shipping(order.id, shipping).await?;
        }

        Ok(transition)
    }

    /// Marks the order for `session_id` as failed. Idempotent.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, session_id: &str) -> Result<Transition, ServiceError> {
        self.transition_from_pending(session_id, OrderStatus::Failed)
            .await
    }

    /// Marks the order for `session_id` as expired. Idempotent.
    #[instrument(skip(self))]
    pub async fn mark_expired(&self, session_id: &str) -> Result<Transition, ServiceError> {
        self.transition_from_pending(session_id, OrderStatus::Expired)
            .await
    }

    async fn transition_from_pending(
        &self,
        session_id: &str,
        new_status: OrderStatus,
    ) -> Result<Transition, ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::PaymentSessionId.eq(session_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        self.resolve_transition(session_id, new_status, result.rows_affected)
            .await
    }

    async fn resolve_transition(
        &self,
        session_id: &str,
        new_status: OrderStatus,
        rows_affected: u64,
    ) -> Result<Transition, ServiceError> {
        let Some(order) = self.find_by_session_id(session_id).await? else {
            warn!(%session_id, "No order for session");
            return Ok(Transition::NotFound);
        };

        if rows_affected == 0 {
            info!(
                %session_id,
                status = %order.status,
                "Order already settled; transition skipped"
            );
            return Ok(Transition::AlreadyFinal(order));
        }

        info!(order_id = %order.id, %new_status, "Order status updated");
        self.send_event(Event::OrderStatusChanged {
            order_id: order.id,
            old_status: OrderStatus::Pending,
            new_status,
        })
        .await;

        Ok(Transition::Applied(order))
    }

    async fn attach_shipping(
        &self,
        order_id: Uuid,
        info: ShippingInfo,
    ) -> Result<(), ServiceError> {
        let existing = shipping_address::Entity::find()
            .filter(shipping_address::Column::OrderId.eq(order_id))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let insert = shipping_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            name: Set(info.name),
            line1: Set(info.line1),
            line2: Set(info.line2),
            city: Set(info.city),
            state: Set(info.state),
            postal_code: Set(info.postal_code),
            country: Set(info.country),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await;

        match insert {
            Ok(_) => Ok(()),
            // Lost the race to a concurrent delivery; the first write stands.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(()),
            Err(e) => Err(ServiceError::DatabaseError(e)),
        }
    }

    /// Records a paid order for a session that has no local row, using the
    /// provider's view of the session. Items cannot be reconstructed from
    /// the session, so the order is recorded without line items.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn backfill_from_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<order::Model, ServiceError> {
        let confirmation = PaymentConfirmation::from_session(session);

        let order_id = Uuid::new_v4();
        let insert = order::ActiveModel {
            id: Set(order_id),
            payment_session_id: Set(session.id.clone()),
            payment_intent_id: Set(confirmation.payment_intent_id.clone()),
            customer_email: Set(confirmation.customer_email.clone()),
            customer_name: Set(confirmation.customer_name.clone()),
            amount_total: Set(session.amount_total.unwrap_or(0)),
            currency: Set(session
                .currency
                .clone()
                .unwrap_or_else(|| "usd".to_string())),
            status: Set(OrderStatus::Paid),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        let model = match insert {
            Ok(model) => {
                warn!(%order_id, "Backfilled order missing from local records");
                self.send_event(Event::OrderBackfilled(order_id)).await;
                model
            }
            // A concurrent webhook or checkout write beat us to it.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => self
                .find_by_session_id(&session.id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError("order vanished after conflict".to_string())
                })?,
            Err(e) => return Err(ServiceError::DatabaseError(e)),
        };

        if let Some(shipping) = confirmation.shipping {
            self.attach_shipping(model.id, shipping).await?;
        }

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_display_formats_cents() {
        assert_eq!(format_amount_display(4599), "$45.99");
        assert_eq!(format_amount_display(100), "$1.00");
        assert_eq!(format_amount_display(7), "$0.07");
        assert_eq!(format_amount_display(0), "$0.00");
    }

    #[test]
    fn confirmation_extracts_session_details() {
        let session: CheckoutSession = serde_json::from_str(
            r#"{
                "id": "cs_1",
                "payment_status": "paid",
                "payment_intent": "pi_1",
                "customer_details": {"email": "a@b.c", "name": "A B"},
                "shipping_details": {"name": "A B", "address": {"line1": "1 Main", "country": "US"}}
            }"#,
        )
        .unwrap();

        let confirmation = PaymentConfirmation::from_session(&session);
        assert_eq!(confirmation.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(confirmation.customer_email.as_deref(), Some("a@b.c"));
        let shipping = confirmation.shipping.unwrap();
        assert_eq!(shipping.line1.as_deref(), Some("1 Main"));
        assert_eq!(shipping.country.as_deref(), Some("US"));
    }
}
