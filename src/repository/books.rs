//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, Category, CreateBook, UpdateBook},
};

use super::{map_unique_violation, BookStore};

pub(crate) const BOOK_COLUMNS: &str = "id, title, author, description, isbn, category, \
     total_copies, available_copies, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Whether a book exists and is not soft-deleted
    async fn exists_live(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let books = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {BOOK_COLUMNS}
            FROM books
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR LOWER(category) = LOWER($1))
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&query.category)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM books
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR LOWER(category) = LOWER($1))
            "#,
        )
        .bind(&query.category)
        .fetch_one(&self.pool)
        .await?;

        Ok((books, total))
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, description, isbn, category, total_copies, available_copies)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.description)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        // The copy shift and its guard run in a single statement so a
        // concurrent borrow cannot slip between check and write.
        let updated = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                description = COALESCE($4, description),
                isbn = COALESCE($5, isbn),
                category = COALESCE($6, category),
                available_copies = available_copies + (COALESCE($7, total_copies) - total_copies),
                total_copies = COALESCE($7, total_copies),
                updated_at = NOW()
            WHERE id = $1
              AND deleted_at IS NULL
              AND available_copies + (COALESCE($7, total_copies) - total_copies) >= 0
            RETURNING {BOOK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.author)
        .bind(&changes.description)
        .bind(&changes.isbn)
        .bind(&changes.category)
        .bind(changes.total_copies)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(book) => Ok(book),
            None if self.exists_live(id).await? => Err(AppError::Validation(
                "Total copies cannot be less than the copies currently on loan".to_string(),
            )),
            None => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL AND available_copies = total_copies
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        if self.exists_live(id).await? {
            Err(AppError::Validation(
                "Book cannot be deleted while copies are on loan".to_string(),
            ))
        } else {
            Err(AppError::NotFound(format!("Book with id {} not found", id)))
        }
    }

    async fn suggestions(&self, limit: i64) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT b.id, b.title, b.author, b.description, b.isbn, b.category,
                   b.total_copies, b.available_copies, b.created_at, b.updated_at
            FROM books b
            LEFT JOIN transactions t ON t.book_id = b.id
            WHERE b.deleted_at IS NULL AND b.available_copies > 0
            GROUP BY b.id
            ORDER BY COUNT(t.id) DESC, b.id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn categories(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at FROM categories ORDER BY LOWER(name)",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn find_category(&self, name: &str) -> AppResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at FROM categories WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    async fn add_category(&self, name: &str) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Category already exists"))
    }
}
