//! Welcome and health check endpoints

use serde::Serialize;
use utoipa::ToSchema;

use super::{Json, MessageResponse};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub message: String,
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Welcome message", body = MessageResponse)
    )
)]
pub async fn welcome() -> Json<MessageResponse> {
    Json(MessageResponse::new("Welcome to the Hello Books API"))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Service is up and running".to_string(),
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
