//! Borrow and return endpoints

use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::transaction::{Transaction, TransactionDetails},
    AppState,
};

use super::{AuthenticatedUser, Json, Path};

/// Borrow or return request
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookIdRequest {
    pub book_id: i32,
}

#[derive(Serialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,
    pub transaction: Transaction,
}

#[derive(Serialize, ToSchema)]
pub struct BorrowedBooksResponse {
    pub message: String,
    /// Open transactions with their books
    pub books: Vec<TransactionDetails>,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub message: String,
    pub transactions: Vec<TransactionDetails>,
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/users/{id}/books",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = BookIdRequest,
    responses(
        (status = 201, description = "Book borrowed", body = TransactionResponse),
        (status = 403, description = "Not your account", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copy left, already borrowed or limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Json(request): Json<BookIdRequest>,
) -> AppResult<(StatusCode, Json<TransactionResponse>)> {
    state.services.access.require_self_or_admin(&claims, user_id).await?;

    let transaction = state
        .services
        .transactions
        .borrow(user_id, request.book_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            message: "You have successfully borrowed the book".to_string(),
            transaction,
        }),
    ))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/users/{id}/books",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = BookIdRequest,
    responses(
        (status = 200, description = "Book returned", body = TransactionResponse),
        (status = 404, description = "No open transaction for this book", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Json(request): Json<BookIdRequest>,
) -> AppResult<Json<TransactionResponse>> {
    state.services.access.require_self_or_admin(&claims, user_id).await?;

    let transaction = state
        .services
        .transactions
        .return_book(user_id, request.book_id)
        .await?;

    Ok(Json(TransactionResponse {
        message: "You have successfully returned the book".to_string(),
        transaction,
    }))
}

/// Books a user currently holds
#[utoipa::path(
    get,
    path = "/users/{id}/books",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Borrowed books", body = BorrowedBooksResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrowed_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<BorrowedBooksResponse>> {
    state.services.access.require_self_or_admin(&claims, user_id).await?;

    let books = state.services.transactions.borrowed_books(user_id).await?;
    let message = if books.is_empty() {
        "You have not borrowed any books"
    } else {
        "Borrowed books retrieved successfully"
    };

    Ok(Json(BorrowedBooksResponse {
        message: message.to_string(),
        books,
    }))
}

/// Borrow history of a user, newest first
#[utoipa::path(
    get,
    path = "/users/{id}/transactions",
    tag = "transactions",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Transaction history", body = HistoryResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i32>,
) -> AppResult<Json<HistoryResponse>> {
    state.services.access.require_self_or_admin(&claims, user_id).await?;

    let transactions = state.services.transactions.history(user_id).await?;
    Ok(Json(HistoryResponse {
        message: "Transactions retrieved successfully".to_string(),
        transactions,
    }))
}
