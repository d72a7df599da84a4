//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, notifications, transactions, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hello Books API",
        version = "1.0.0",
        description = "Library management REST API",
        license(name = "MIT")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::welcome,
        health::health_check,
        // Users
        users::signup,
        users::signin,
        users::update_profile,
        // Transactions
        transactions::borrow_book,
        transactions::return_book,
        transactions::borrowed_books,
        transactions::history,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::edit_book,
        books::delete_book,
        books::suggestions,
        books::list_categories,
        books::add_category,
        // Admin
        notifications::list_notifications,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::Category,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::CreateCategory,
            books::BookListResponse,
            books::BookResponse,
            books::SuggestionsResponse,
            books::CategoriesResponse,
            books::CategoryResponse,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::SignupRequest,
            crate::models::user::SigninRequest,
            crate::models::user::UpdateProfile,
            users::AuthResponse,
            users::UserResponse,
            // Transactions
            crate::models::transaction::Transaction,
            crate::models::transaction::TransactionDetails,
            transactions::BookIdRequest,
            transactions::TransactionResponse,
            transactions::BorrowedBooksResponse,
            transactions::HistoryResponse,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            notifications::NotificationsResponse,
            // Health
            health::HealthResponse,
            // Common
            crate::api::MessageResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Accounts and authentication"),
        (name = "books", description = "Catalog management"),
        (name = "transactions", description = "Borrowing and returning books"),
        (name = "admin", description = "Administrator feeds")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
