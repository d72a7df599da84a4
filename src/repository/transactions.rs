//! Transactions repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        notification::{Notification, NotificationKind},
        transaction::{NewBorrow, Transaction},
    },
};

use super::TransactionStore;

const TRANSACTION_COLUMNS: &str = "id, user_id, book_id, borrowed_at, due_at, returned_at";

/// Joined transaction + book select; book columns are prefixed with `b_`
const DETAILS_SELECT: &str = r#"
    SELECT t.id, t.user_id, t.book_id, t.borrowed_at, t.due_at, t.returned_at,
           b.title AS b_title, b.author AS b_author, b.description AS b_description,
           b.isbn AS b_isbn, b.category AS b_category, b.total_copies AS b_total_copies,
           b.available_copies AS b_available_copies, b.created_at AS b_created_at,
           b.updated_at AS b_updated_at
    FROM transactions t
    JOIN books b ON b.id = t.book_id
"#;

fn details_from_row(row: &PgRow) -> (Transaction, Book) {
    let transaction = Transaction {
        id: row.get("id"),
        user_id: row.get("user_id"),
        book_id: row.get("book_id"),
        borrowed_at: row.get("borrowed_at"),
        due_at: row.get("due_at"),
        returned_at: row.get("returned_at"),
    };
    let book = Book {
        id: transaction.book_id,
        title: row.get("b_title"),
        author: row.get("b_author"),
        description: row.get("b_description"),
        isbn: row.get("b_isbn"),
        category: row.get("b_category"),
        total_copies: row.get("b_total_copies"),
        available_copies: row.get("b_available_copies"),
        created_at: row.get("b_created_at"),
        updated_at: row.get("b_updated_at"),
    };
    (transaction, book)
}

#[derive(Clone)]
pub struct TransactionsRepository {
    pool: Pool<Postgres>,
}

impl TransactionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionsRepository {
    async fn open_for_user(&self, user_id: i32) -> AppResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE user_id = $1 AND returned_at IS NULL
            ORDER BY borrowed_at, id
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn borrow(&self, borrow: &NewBorrow) -> AppResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        // Lock the borrower so concurrent borrows by the same user serialize
        // their duplicate and limit checks.
        let locked: Option<i32> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(borrow.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("User with id {} not found", borrow.user_id)));
        }

        let already_open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM transactions
                WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
            )
            "#,
        )
        .bind(borrow.user_id)
        .bind(borrow.book_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_open {
            return Err(AppError::Duplicate(
                "You have already borrowed this book and not returned it".to_string(),
            ));
        }

        let open_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND returned_at IS NULL",
        )
        .bind(borrow.user_id)
        .fetch_one(&mut *tx)
        .await?;
        if open_count >= borrow.borrow_limit {
            return Err(AppError::LimitExceeded(format!(
                "You cannot borrow more than {} books at a time",
                borrow.borrow_limit
            )));
        }

        let decremented: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND available_copies > 0
            RETURNING id
            "#,
        )
        .bind(borrow.book_id)
        .fetch_optional(&mut *tx)
        .await?;
        if decremented.is_none() {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM books WHERE id = $1 AND deleted_at IS NULL)",
            )
            .bind(borrow.book_id)
            .fetch_one(&mut *tx)
            .await?;
            return Err(if exists {
                AppError::Unavailable("There are no copies of this book left to borrow".to_string())
            } else {
                AppError::NotFound(format!("Book with id {} not found", borrow.book_id))
            });
        }

        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            INSERT INTO transactions (user_id, book_id, borrowed_at, due_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(borrow.user_id)
        .bind(borrow.book_id)
        .bind(borrow.borrowed_at)
        .bind(borrow.due_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (kind, transaction_id, user_id, book_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(NotificationKind::Borrow)
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.book_id)
        .bind(transaction.borrowed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        // A concurrent return blocks on the row lock, then sees returned_at set.
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            UPDATE transactions SET returned_at = $3
            WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(returned_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("You have no open transaction for this book".to_string())
        })?;

        sqlx::query(
            r#"
            UPDATE books
            SET available_copies = LEAST(available_copies + 1, total_copies), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (kind, transaction_id, user_id, book_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(NotificationKind::Return)
        .bind(transaction.id)
        .bind(user_id)
        .bind(book_id)
        .bind(returned_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }

    async fn borrowed_books(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>> {
        let rows = sqlx::query(&format!(
            "{DETAILS_SELECT} WHERE t.user_id = $1 AND t.returned_at IS NULL ORDER BY t.borrowed_at, t.id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(details_from_row).collect())
    }

    async fn history(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>> {
        let rows = sqlx::query(&format!(
            "{DETAILS_SELECT} WHERE t.user_id = $1 ORDER BY t.borrowed_at DESC, t.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(details_from_row).collect())
    }

    async fn notifications(&self, limit: i64) -> AppResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT n.id, n.kind, n.transaction_id, n.user_id, u.username,
                   n.book_id, b.title AS book_title, n.created_at
            FROM notifications n
            JOIN users u ON u.id = n.user_id
            JOIN books b ON b.id = n.book_id
            ORDER BY n.created_at DESC, n.id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }
}
