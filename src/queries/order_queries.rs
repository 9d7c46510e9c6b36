//! Read-side queries for order reporting.
//!
//! Aggregations are folded in Rust after narrow fetches instead of pushed
//! into SQL, so the same code runs against Postgres and SQLite.

use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::db::DbPool;
use crate::entities::{order, order_item, shipping_address, OrderStatus};
use crate::errors::ServiceError;
use crate::services::orders::{format_amount_display, OrderResponse};

/// Aggregate order statistics.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderStats {
    pub total_orders: u64,
    pub paid_orders: u64,
    /// Revenue across paid orders, in minor currency units.
    pub total_revenue: i64,
    pub total_revenue_display: String,
    /// Orders created in the last 7 days.
    pub recent_orders: u64,
}

/// Per-product sales rollup across paid orders.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductRollup {
    pub product_id: String,
    pub product_name: String,
    pub units_sold: i64,
    /// Revenue in minor currency units.
    pub revenue: i64,
    pub revenue_display: String,
}

pub struct OrderQueries;

impl OrderQueries {
    /// Lists orders newest-first with items and shipping attached, plus the
    /// total count for pagination.
    pub async fn list_enriched(
        db: &DbPool,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let total = order::Entity::find().count(db).await?;

        let orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await?;

        if orders.is_empty() {
            return Ok((Vec::new(), total));
        }

        let order_ids: Vec<_> = orders.iter().map(|o| o.id).collect();

        let mut items_by_order: HashMap<_, Vec<order_item::Model>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let mut shipping_by_order: HashMap<_, shipping_address::Model> = HashMap::new();
        for address in shipping_address::Entity::find()
            .filter(shipping_address::Column::OrderId.is_in(order_ids))
            .all(db)
            .await?
        {
            shipping_by_order.insert(address.order_id, address);
        }

        let enriched = orders
            .into_iter()
            .map(|o| {
                let items = items_by_order.remove(&o.id).unwrap_or_default();
                let shipping = shipping_by_order.remove(&o.id);
                OrderResponse::from_parts(o, items, shipping)
            })
            .collect();

        Ok((enriched, total))
    }

    /// Computes aggregate statistics over all orders.
    pub async fn stats(db: &DbPool) -> Result<OrderStats, ServiceError> {
        let total_orders = order::Entity::find().count(db).await?;

        let paid_totals: Vec<i64> = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .select_only()
            .column(order::Column::AmountTotal)
            .into_tuple()
            .all(db)
            .await?;

        let paid_orders = paid_totals.len() as u64;
        let total_revenue: i64 = paid_totals.iter().sum();

        let week_ago = Utc::now() - Duration::days(7);
        let recent_orders = order::Entity::find()
            .filter(order::Column::CreatedAt.gte(week_ago))
            .count(db)
            .await?;

        Ok(OrderStats {
            total_orders,
            paid_orders,
            total_revenue,
            total_revenue_display: format_amount_display(total_revenue),
            recent_orders,
        })
    }

    /// Rolls up units sold and revenue per product across paid orders.
    pub async fn product_rollups(db: &DbPool) -> Result<Vec<ProductRollup>, ServiceError> {
        let paid_items: Vec<order_item::Model> = order_item::Entity::find()
            .join(JoinType::InnerJoin, order_item::Relation::Order.def())
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .all(db)
            .await?;

        let mut rollups: HashMap<String, ProductRollup> = HashMap::new();
        for item in paid_items {
            let entry = rollups
                .entry(item.product_id.clone())
                .or_insert_with(|| ProductRollup {
                    product_id: item.product_id.clone(),
                    product_name: item.product_name.clone(),
                    units_sold: 0,
                    revenue: 0,
                    revenue_display: String::new(),
                });
            entry.units_sold += item.quantity as i64;
            entry.revenue += item.price * item.quantity as i64;
        }

        let mut result: Vec<_> = rollups.into_values().collect();
        for rollup in &mut result {
            rollup.revenue_display = format_amount_display(rollup.revenue);
        }
        result.sort_by(|a, b| b.revenue.cmp(&a.revenue));

        Ok(result)
    }
}
