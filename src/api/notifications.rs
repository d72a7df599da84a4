//! Admin notification feed

use axum::extract::State;
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::notification::{Notification, NotificationQuery},
    AppState,
};

use super::{AdminUser, Json, Query};

#[derive(Serialize, ToSchema)]
pub struct NotificationsResponse {
    pub message: String,
    pub notifications: Vec<Notification>,
}

/// Recent borrow and return events
#[utoipa::path(
    get,
    path = "/admin-notifications",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(NotificationQuery),
    responses(
        (status = 200, description = "Newest notifications first", body = NotificationsResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Query(query): Query<NotificationQuery>,
) -> AppResult<Json<NotificationsResponse>> {
    query.validate()?;
    let notifications = state
        .services
        .transactions
        .admin_notifications(query.limit())
        .await?;

    Ok(Json(NotificationsResponse {
        message: "Notifications retrieved successfully".to_string(),
        notifications,
    }))
}
