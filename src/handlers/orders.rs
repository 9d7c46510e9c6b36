use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{ErrorResponse, ServiceError};
use crate::handlers::common::require_admin;
use crate::queries::{OrderQueries, OrderStats, ProductRollup};
use crate::services::orders::OrderResponse;
use crate::AppState;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListOrdersParams {
    /// Page size, capped at 100.
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub stats: OrderStats,
    pub pagination: Pagination,
}

/// Lists orders newest-first with aggregate statistics.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    params(ListOrdersParams),
    responses(
        (status = 200, description = "Orders with stats", body = OrderListResponse),
        (status = 401, description = "Missing or invalid admin token", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    require_admin(&state.config, &headers)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let (orders, total) = OrderQueries::list_enriched(&state.db, limit, offset).await?;
    let stats = OrderQueries::stats(&state.db).await?;

    Ok(Json(OrderListResponse {
        orders,
        stats,
        pagination: Pagination {
            limit,
            offset,
            total,
            has_more: offset + limit < total,
        },
    }))
}

/// Per-product sales rollups across paid orders.
#[utoipa::path(
    get,
    path = "/api/v1/orders/rollups",
    tag = "orders",
    responses(
        (status = 200, description = "Product rollups", body = [ProductRollup]),
        (status = 401, description = "Missing or invalid admin token", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
pub async fn product_rollups(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProductRollup>>, ServiceError> {
    require_admin(&state.config, &headers)?;

    let rollups = OrderQueries::product_rollups(&state.db).await?;
    Ok(Json(rollups))
}
