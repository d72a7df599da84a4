//! API handlers for Hello Books REST endpoints

pub mod books;
pub mod health;
pub mod notifications;
pub mod openapi;
pub mod transactions;
pub mod users;

use std::time::Duration;

use axum::{
    async_trait,
    error_handling::HandleErrorLayer,
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    BoxError, Router,
};
use serde::Serialize;
use tower::{timeout::error::Elapsed, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// JSON body whose rejections surface as `AppError::Validation`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Path parameters; a malformed id is a validation error
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

/// Query string parameters
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".to_string()))?;

        let claims = state.services.access.authenticate(token)?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Extractor for an authenticated user holding the admin role
pub struct AdminUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(claims) = AuthenticatedUser::from_request_parts(parts, state).await?;
        state.services.access.require_admin(claims.user_id).await?;
        Ok(AdminUser(claims))
    }
}

/// Body of a plain acknowledgement
#[derive(Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Catch-all for unknown routes
pub async fn fallback() -> AppError {
    AppError::NotFound("Seems like you might be lost".to_string())
}

/// Turn middleware failures into the usual error body
async fn handle_middleware_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::Timeout("The request took too long to complete".to_string())
    } else {
        AppError::Internal(format!("Unhandled middleware error: {}", err))
    }
}

/// Abort requests running longer than `timeout`
fn with_timeout(router: Router, timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .timeout(timeout),
    )
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let api_v1 = Router::new()
        .route("/", get(health::welcome))
        .route("/health", get(health::health_check))
        // Users
        .route("/users", put(users::update_profile))
        .route("/users/signup", post(users::signup))
        .route("/users/signin", post(users::signin))
        .route(
            "/users/:id/books",
            get(transactions::borrowed_books)
                .post(transactions::borrow_book)
                .put(transactions::return_book),
        )
        .route("/users/:id/transactions", get(transactions::history))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/category", get(books::list_categories).post(books::add_category))
        .route("/books/suggestions", get(books::suggestions))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::edit_book)
                .delete(books::delete_book),
        )
        // Admin
        .route("/admin-notifications", get(notifications::list_notifications))
        .with_state(state);

    let app = Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .fallback(fallback);

    with_timeout(app, timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    #[tokio::test]
    async fn slow_requests_time_out_with_error_body() {
        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done"
            }),
        );
        let app = with_timeout(slow, Duration::from_millis(20));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["message"], "The request took too long to complete");
    }
}
