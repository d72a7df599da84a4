//! Repository layer for database operations
//!
//! Services talk to the store through the traits below. Two backends
//! implement them: Postgres (`books`, `users`, `transactions`) and a
//! process-local store (`memory`).

pub mod books;
pub mod memory;
pub mod transactions;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, Category, CreateBook, UpdateBook},
        notification::Notification,
        transaction::{NewBorrow, Transaction},
        user::{NewUser, ProfileChanges, User},
    },
};

/// Catalog persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Page of live books ordered by id, plus the total matching count
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;

    /// Live (not deleted) book by id
    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    /// Insert a book with all copies available; `category` must be canonical
    async fn create(&self, book: &CreateBook) -> AppResult<Book>;

    /// Apply a partial update. A `total_copies` change shifts
    /// `available_copies` by the same delta and fails with `Validation`
    /// when that would leave fewer copies than are on loan.
    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book>;

    /// Soft delete; fails with `Validation` while copies are on loan
    async fn delete(&self, id: i32) -> AppResult<()>;

    /// Available books, most borrowed first
    async fn suggestions(&self, limit: i64) -> AppResult<Vec<Book>>;

    /// Category set, alphabetical
    async fn categories(&self) -> AppResult<Vec<Category>>;

    /// Case-insensitive category lookup
    async fn find_category(&self, name: &str) -> AppResult<Option<Category>>;

    /// Fails with `Duplicate` when the label exists (case-insensitive)
    async fn add_category(&self, name: &str) -> AppResult<Category>;
}

/// User persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<User>>;

    /// Case-insensitive username lookup
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    async fn username_exists(&self, username: &str) -> AppResult<bool>;

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool>;

    /// Fails with `Duplicate` on a username or e-mail clash
    async fn create(&self, user: &NewUser) -> AppResult<User>;

    async fn update_profile(&self, id: i32, changes: &ProfileChanges) -> AppResult<User>;
}

/// Borrow transaction persistence. The only writer of transactions,
/// notifications and `Book::available_copies` on borrow/return.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Open transactions of a user, oldest first
    async fn open_for_user(&self, user_id: i32) -> AppResult<Vec<Transaction>>;

    /// Atomically record a borrow. Re-checks every guard of [`NewBorrow`]
    /// and fails with `NotFound`, `Duplicate`, `LimitExceeded` or
    /// `Unavailable` without writing anything.
    async fn borrow(&self, borrow: &NewBorrow) -> AppResult<Transaction>;

    /// Atomically close the open transaction for (user, book) and give the
    /// copy back. Fails with `NotFound` when there is none.
    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction>;

    /// Open transactions with their books (deleted books included)
    async fn borrowed_books(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>>;

    /// Every transaction of a user with its book, newest first
    async fn history(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>>;

    /// Newest notifications first
    async fn notifications(&self, limit: i64) -> AppResult<Vec<Notification>>;
}

/// Store handle injected into services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub transactions: Arc<dyn TransactionStore>,
}

impl Repository {
    /// Repository backed by a Postgres pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            transactions: Arc::new(transactions::TransactionsRepository::new(pool)),
        }
    }

    /// Repository backed by process-local state
    pub fn in_memory() -> Self {
        Self::from_memory(memory::MemoryStore::new())
    }

    pub fn from_memory(store: memory::MemoryStore) -> Self {
        Self {
            books: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            transactions: Arc::new(store),
        }
    }
}

/// Postgres SQLSTATE for unique violations
const UNIQUE_VIOLATION: &str = "23505";

/// Translate a unique violation into `Duplicate`, leaving other errors alone
pub(crate) fn map_unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            AppError::Duplicate(message.to_string())
        }
        _ => AppError::Database(err),
    }
}
