//! Process-local store.
//!
//! Every trait method takes the single state lock for its whole body, so
//! each call is atomic with respect to the others, the same guarantee the
//! Postgres repository gets from its SQL transactions.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, Category, CreateBook, UpdateBook},
        notification::{Notification, NotificationKind},
        transaction::{NewBorrow, Transaction},
        user::{NewUser, ProfileChanges, User, UserRow},
    },
};

use super::{BookStore, TransactionStore, UserStore};

#[derive(Debug)]
struct StoredBook {
    book: Book,
    deleted: bool,
}

#[derive(Debug)]
struct StoredNotification {
    id: i32,
    kind: NotificationKind,
    transaction_id: i32,
    user_id: i32,
    book_id: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    books: BTreeMap<i32, StoredBook>,
    categories: BTreeMap<i32, Category>,
    users: BTreeMap<i32, UserRow>,
    transactions: BTreeMap<i32, Transaction>,
    notifications: Vec<StoredNotification>,
    next_book_id: i32,
    next_category_id: i32,
    next_user_id: i32,
    next_transaction_id: i32,
}

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

impl State {
    fn live_book(&self, id: i32) -> Option<&Book> {
        self.books.get(&id).filter(|s| !s.deleted).map(|s| &s.book)
    }

    fn open_transactions(&self, user_id: i32) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .values()
            .filter(move |t| t.user_id == user_id && t.is_open())
    }

    fn user(&self, row: &UserRow) -> User {
        let borrowed = self.open_transactions(row.id).map(|t| t.book_id).collect();
        row.clone().into_user(borrowed)
    }

    fn find_category(&self, name: &str) -> Option<&Category> {
        self.categories
            .values()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn with_book(&self, transaction: &Transaction) -> Option<(Transaction, Book)> {
        self.books
            .get(&transaction.book_id)
            .map(|s| (transaction.clone(), s.book.clone()))
    }

    fn notify(&mut self, kind: NotificationKind, transaction: &Transaction, at: DateTime<Utc>) {
        let id = self.notifications.len() as i32 + 1;
        self.notifications.push(StoredNotification {
            id,
            kind,
            transaction_id: transaction.id,
            user_id: transaction.user_id,
            book_id: transaction.book_id,
            created_at: at,
        });
    }
}

/// In-memory store shared by clones
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn list(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state.lock().await;
        let matching: Vec<&Book> = state
            .books
            .values()
            .filter(|s| !s.deleted)
            .map(|s| &s.book)
            .filter(|b| match &query.category {
                Some(category) => b.category.eq_ignore_ascii_case(category),
                None => true,
            })
            .collect();

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.limit().max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let state = self.state.lock().await;
        Ok(state.live_book(id).cloned())
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let id = next_id(&mut state.next_book_id);
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            isbn: book.isbn.clone(),
            category: book.category.clone(),
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(id, StoredBook { book: created.clone(), deleted: false });
        Ok(created)
    }

    async fn update(&self, id: i32, changes: &UpdateBook) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let stored = state
            .books
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        let book = &mut stored.book;

        if let Some(total) = changes.total_copies {
            let available = book.available_copies + (total - book.total_copies);
            if available < 0 {
                return Err(AppError::Validation(
                    "Total copies cannot be less than the copies currently on loan".to_string(),
                ));
            }
            book.total_copies = total;
            book.available_copies = available;
        }
        if let Some(title) = &changes.title {
            book.title = title.clone();
        }
        if let Some(author) = &changes.author {
            book.author = author.clone();
        }
        if let Some(description) = &changes.description {
            book.description = Some(description.clone());
        }
        if let Some(isbn) = &changes.isbn {
            book.isbn = Some(isbn.clone());
        }
        if let Some(category) = &changes.category {
            book.category = category.clone();
        }
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .books
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        if stored.book.on_loan() > 0 {
            return Err(AppError::Validation(
                "Book cannot be deleted while copies are on loan".to_string(),
            ));
        }
        stored.deleted = true;
        stored.book.updated_at = Utc::now();
        Ok(())
    }

    async fn suggestions(&self, limit: i64) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut candidates: Vec<(usize, &Book)> = state
            .books
            .values()
            .filter(|s| !s.deleted && s.book.is_available())
            .map(|s| {
                let borrows = state
                    .transactions
                    .values()
                    .filter(|t| t.book_id == s.book.id)
                    .count();
                (borrows, &s.book)
            })
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        Ok(candidates
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn categories(&self) -> AppResult<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by_key(|c| c.name.to_lowercase());
        Ok(categories)
    }

    async fn find_category(&self, name: &str) -> AppResult<Option<Category>> {
        let state = self.state.lock().await;
        Ok(state.find_category(name).cloned())
    }

    async fn add_category(&self, name: &str) -> AppResult<Category> {
        let mut state = self.state.lock().await;
        if state.find_category(name).is_some() {
            return Err(AppError::Duplicate("Category already exists".to_string()));
        }
        let id = next_id(&mut state.next_category_id);
        let category = Category {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.categories.insert(id, category.clone());
        Ok(category)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&id).map(|row| state.user(row)))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .map(|row| state.user(row)))
    }

    async fn username_exists(&self, username: &str) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(username)))
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email) && Some(u.id) != exclude_id))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let taken = state.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(&user.username) || u.email.eq_ignore_ascii_case(&user.email)
        });
        if taken {
            return Err(AppError::Duplicate("Username or email already taken".to_string()));
        }

        let now = Utc::now();
        let id = next_id(&mut state.next_user_id);
        let row = UserRow {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, row.clone());
        Ok(row.into_user(Vec::new()))
    }

    async fn update_profile(&self, id: i32, changes: &ProfileChanges) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if let Some(email) = &changes.email {
            let clash = state
                .users
                .values()
                .any(|u| u.id != id && u.email.eq_ignore_ascii_case(email));
            if clash {
                return Err(AppError::Duplicate("Email already taken".to_string()));
            }
        }

        let row = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        if let Some(email) = &changes.email {
            row.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            row.password_hash = hash.clone();
        }
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(state.user(&row))
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn open_for_user(&self, user_id: i32) -> AppResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.open_transactions(user_id).cloned().collect())
    }

    async fn borrow(&self, borrow: &NewBorrow) -> AppResult<Transaction> {
        let mut state = self.state.lock().await;

        if !state.users.contains_key(&borrow.user_id) {
            return Err(AppError::NotFound(format!("User with id {} not found", borrow.user_id)));
        }
        if state
            .open_transactions(borrow.user_id)
            .any(|t| t.book_id == borrow.book_id)
        {
            return Err(AppError::Duplicate(
                "You have already borrowed this book and not returned it".to_string(),
            ));
        }
        if state.open_transactions(borrow.user_id).count() as i64 >= borrow.borrow_limit {
            return Err(AppError::LimitExceeded(format!(
                "You cannot borrow more than {} books at a time",
                borrow.borrow_limit
            )));
        }

        let stored = state
            .books
            .get_mut(&borrow.book_id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", borrow.book_id)))?;
        if stored.book.available_copies <= 0 {
            return Err(AppError::Unavailable(
                "There are no copies of this book left to borrow".to_string(),
            ));
        }
        stored.book.available_copies -= 1;
        stored.book.updated_at = Utc::now();

        let id = next_id(&mut state.next_transaction_id);
        let transaction = Transaction {
            id,
            user_id: borrow.user_id,
            book_id: borrow.book_id,
            borrowed_at: borrow.borrowed_at,
            due_at: borrow.due_at,
            returned_at: None,
        };
        state.transactions.insert(id, transaction.clone());
        state.notify(NotificationKind::Borrow, &transaction, borrow.borrowed_at);
        Ok(transaction)
    }

    async fn return_book(
        &self,
        user_id: i32,
        book_id: i32,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        let mut state = self.state.lock().await;

        let transaction = state
            .transactions
            .values_mut()
            .find(|t| t.user_id == user_id && t.book_id == book_id && t.is_open())
            .ok_or_else(|| {
                AppError::NotFound("You have no open transaction for this book".to_string())
            })?;
        transaction.returned_at = Some(returned_at);
        let transaction = transaction.clone();

        if let Some(stored) = state.books.get_mut(&book_id) {
            stored.book.available_copies =
                (stored.book.available_copies + 1).min(stored.book.total_copies);
            stored.book.updated_at = Utc::now();
        }
        state.notify(NotificationKind::Return, &transaction, returned_at);
        Ok(transaction)
    }

    async fn borrowed_books(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>> {
        let state = self.state.lock().await;
        Ok(state
            .open_transactions(user_id)
            .filter_map(|t| state.with_book(t))
            .collect())
    }

    async fn history(&self, user_id: i32) -> AppResult<Vec<(Transaction, Book)>> {
        let state = self.state.lock().await;
        let mut history: Vec<(Transaction, Book)> = state
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .filter_map(|t| state.with_book(t))
            .collect();
        history.sort_by(|a, b| {
            b.0.borrowed_at
                .cmp(&a.0.borrowed_at)
                .then(b.0.id.cmp(&a.0.id))
        });
        Ok(history)
    }

    async fn notifications(&self, limit: i64) -> AppResult<Vec<Notification>> {
        let state = self.state.lock().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .map(|n| Notification {
                id: n.id,
                kind: n.kind,
                transaction_id: n.transaction_id,
                user_id: n.user_id,
                username: state
                    .users
                    .get(&n.user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                book_id: n.book_id,
                book_title: state
                    .books
                    .get(&n.book_id)
                    .map(|s| s.book.title.clone())
                    .unwrap_or_default(),
                created_at: n.created_at,
            })
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        notifications.truncate(limit.max(0) as usize);
        Ok(notifications)
    }
}
