//! Catalog endpoints

use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::book::{Book, BookQuery, Category, CreateBook, CreateCategory, SuggestionQuery, UpdateBook},
    AppState,
};

use super::{AdminUser, Json, MessageResponse, Path, Query};

/// Page of books
#[derive(Serialize, ToSchema)]
pub struct BookListResponse {
    pub message: String,
    pub books: Vec<Book>,
    /// Total number of matching books
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub message: String,
    pub book: Book,
}

#[derive(Serialize, ToSchema)]
pub struct SuggestionsResponse {
    pub message: String,
    pub books: Vec<Book>,
}

#[derive(Serialize, ToSchema)]
pub struct CategoriesResponse {
    pub message: String,
    pub categories: Vec<Category>,
}

#[derive(Serialize, ToSchema)]
pub struct CategoryResponse {
    pub message: String,
    pub category: Category,
}

/// List books with pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = BookListResponse),
        (status = 400, description = "Invalid paging parameters", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookListResponse>> {
    let (books, total) = state.services.catalog.list_books(&query).await?;
    let message = if books.is_empty() {
        "No books found"
    } else {
        "Books retrieved successfully"
    };

    Ok(Json(BookListResponse {
        message: message.to_string(),
        books,
        total,
        limit: query.limit(),
        offset: query.offset(),
    }))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookResponse>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(BookResponse {
        message: "Book retrieved successfully".to_string(),
        book,
    }))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookResponse),
        (status = 400, description = "Invalid book", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let book = state.services.catalog.create_book(book).await?;
    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            message: "Book added successfully".to_string(),
            book,
        }),
    ))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Invalid update", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn edit_book(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i32>,
    Json(changes): Json<UpdateBook>,
) -> AppResult<Json<BookResponse>> {
    let book = state.services.catalog.edit_book(id, changes).await?;
    Ok(Json(BookResponse {
        message: "Book updated successfully".to_string(),
        book,
    }))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 400, description = "Copies still on loan", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.delete_book(id).await?;
    Ok(Json(MessageResponse::new("Book deleted successfully")))
}

/// Available books, most borrowed first
#[utoipa::path(
    get,
    path = "/books/suggestions",
    tag = "books",
    params(SuggestionQuery),
    responses(
        (status = 200, description = "Suggested books", body = SuggestionsResponse)
    )
)]
pub async fn suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionQuery>,
) -> AppResult<Json<SuggestionsResponse>> {
    let books = state.services.catalog.suggestions(&query).await?;
    Ok(Json(SuggestionsResponse {
        message: "Suggestions retrieved successfully".to_string(),
        books,
    }))
}

#[utoipa::path(
    get,
    path = "/books/category",
    tag = "books",
    responses(
        (status = 200, description = "Category set", body = CategoriesResponse)
    )
)]
pub async fn list_categories(State(state): State<AppState>) -> AppResult<Json<CategoriesResponse>> {
    let categories = state.services.catalog.categories().await?;
    Ok(Json(CategoriesResponse {
        message: "Categories retrieved successfully".to_string(),
        categories,
    }))
}

/// Add a category label
#[utoipa::path(
    post,
    path = "/books/category",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateCategory,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Blank name", body = crate::error::ErrorResponse),
        (status = 409, description = "Category already exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_category(
    State(state): State<AppState>,
    AdminUser(_claims): AdminUser,
    Json(request): Json<CreateCategory>,
) -> AppResult<(StatusCode, Json<CategoryResponse>)> {
    let category = state.services.catalog.add_category(&request.category).await?;
    Ok((
        StatusCode::CREATED,
        Json(CategoryResponse {
            message: "Category added successfully".to_string(),
            category,
        }),
    ))
}
