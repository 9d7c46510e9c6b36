use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub name: String,
    pub version: String,
    pub environment: String,
}

/// Liveness plus a database ping.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => "up".to_string(),
        Err(_) => "down".to_string(),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        database,
    })
}

/// Build and environment info.
#[utoipa::path(
    get,
    path = "/status",
    tag = "system",
    responses((status = 200, description = "Service status", body = StatusResponse))
)]
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.environment.clone(),
    })
}

/// Gate for reporting endpoints. A configured token must be presented as a
/// bearer credential; with no token configured the endpoints are open in
/// development only.
pub fn require_admin(config: &AppConfig, headers: &HeaderMap) -> Result<(), ServiceError> {
    match &config.admin_api_token {
        Some(token) => {
            let presented = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));

            match presented {
                Some(candidate) if candidate == token => Ok(()),
                _ => Err(ServiceError::Unauthorized(
                    "Invalid or missing admin token".to_string(),
                )),
            }
        }
        None if config.is_development() => Ok(()),
        None => Err(ServiceError::Unauthorized(
            "Admin token is not configured".to_string(),
        )),
    }
}
