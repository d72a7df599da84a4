//! Borrow transaction model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::book::Book;

/// Borrow record; open while `returned_at` is unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at < now
    }
}

/// A guarded borrow write handed to the store.
///
/// The store applies it atomically: it re-checks that the user has no open
/// transaction for the book, that the user holds fewer than `borrow_limit`
/// open transactions, and decrements the book's available copies only if
/// one is left.
#[derive(Debug, Clone)]
pub struct NewBorrow {
    pub user_id: i32,
    pub book_id: i32,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub borrow_limit: i64,
}

/// Transaction with its book, as shown to the borrower
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub book: Book,
    pub overdue: bool,
}

impl TransactionDetails {
    pub fn new(transaction: Transaction, book: Book, now: DateTime<Utc>) -> Self {
        let overdue = transaction.is_overdue(now);
        Self { transaction, book, overdue }
    }
}
