//! Borrow/return transaction engine
//!
//! A borrow runs in two phases. First an ordered list of validation steps
//! inspects a [`BorrowContext`] snapshot and fails fast with a precise
//! error. Then the store performs the guarded write, re-checking the same
//! guards atomically, so a request that loses a race against a concurrent
//! borrow still gets the right error instead of over-lending.

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::Book,
        notification::Notification,
        transaction::{NewBorrow, Transaction, TransactionDetails},
        user::User,
    },
    repository::Repository,
};

/// Borrowing rules
#[derive(Debug, Clone, Copy)]
pub struct LoanPolicy {
    pub borrow_limit: i64,
    pub loan_period: Duration,
}

impl From<&LoansConfig> for LoanPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            borrow_limit: i64::from(config.borrow_limit),
            loan_period: Duration::days(i64::from(config.loan_period_days)),
        }
    }
}

/// Everything the borrow validation steps look at
#[derive(Debug)]
pub struct BorrowContext {
    pub user: User,
    pub book: Book,
    pub open_transactions: Vec<Transaction>,
}

type BorrowStep = fn(&BorrowContext, &LoanPolicy) -> AppResult<()>;

/// Applied in order; the first failure wins
const BORROW_STEPS: &[BorrowStep] = &[ensure_not_duplicate, ensure_below_limit, ensure_available];

fn ensure_not_duplicate(ctx: &BorrowContext, _: &LoanPolicy) -> AppResult<()> {
    if ctx.open_transactions.iter().any(|t| t.book_id == ctx.book.id) {
        return Err(AppError::Duplicate(
            "You have already borrowed this book and not returned it".to_string(),
        ));
    }
    Ok(())
}

fn ensure_below_limit(ctx: &BorrowContext, policy: &LoanPolicy) -> AppResult<()> {
    if ctx.open_transactions.len() as i64 >= policy.borrow_limit {
        return Err(AppError::LimitExceeded(format!(
            "You cannot borrow more than {} books at a time",
            policy.borrow_limit
        )));
    }
    Ok(())
}

fn ensure_available(ctx: &BorrowContext, _: &LoanPolicy) -> AppResult<()> {
    if !ctx.book.is_available() {
        return Err(AppError::Unavailable(
            "There are no copies of this book left to borrow".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct TransactionsService {
    repository: Repository,
    policy: LoanPolicy,
}

impl TransactionsService {
    pub fn new(repository: Repository, policy: LoanPolicy) -> Self {
        Self { repository, policy }
    }

    async fn load_user(&self, user_id: i32) -> AppResult<User> {
        self.repository
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))
    }

    async fn borrow_context(&self, user_id: i32, book_id: i32) -> AppResult<BorrowContext> {
        let user = self.load_user(user_id).await?;
        let book = self
            .repository
            .books
            .get(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        let open_transactions = self.repository.transactions.open_for_user(user_id).await?;
        Ok(BorrowContext { user, book, open_transactions })
    }

    /// Borrow a book: one copy leaves the shelf until `due_at`
    pub async fn borrow(&self, user_id: i32, book_id: i32) -> AppResult<Transaction> {
        self.borrow_at(user_id, book_id, Utc::now()).await
    }

    pub async fn borrow_at(
        &self,
        user_id: i32,
        book_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<Transaction> {
        let ctx = self.borrow_context(user_id, book_id).await?;
        for step in BORROW_STEPS {
            if let Err(e) = step(&ctx, &self.policy) {
                tracing::info!(user_id, book_id, "Borrow rejected: {}", e);
                return Err(e);
            }
        }

        let transaction = self
            .repository
            .transactions
            .borrow(&NewBorrow {
                user_id,
                book_id,
                borrowed_at: now,
                due_at: now + self.policy.loan_period,
                borrow_limit: self.policy.borrow_limit,
            })
            .await
            .map_err(|e| {
                tracing::info!(user_id, book_id, "Borrow rejected by store: {}", e);
                e
            })?;

        tracing::info!(
            user_id,
            book_id,
            transaction_id = transaction.id,
            "Book {} borrowed by {}, due {}",
            ctx.book.title,
            ctx.user.username,
            transaction.due_at
        );
        Ok(transaction)
    }

    /// Return a borrowed book
    pub async fn return_book(&self, user_id: i32, book_id: i32) -> AppResult<Transaction> {
        let transaction = self
            .repository
            .transactions
            .return_book(user_id, book_id, Utc::now())
            .await?;

        tracing::info!(user_id, book_id, transaction_id = transaction.id, "Book returned");
        Ok(transaction)
    }

    /// Books the user currently holds
    pub async fn borrowed_books(&self, user_id: i32) -> AppResult<Vec<TransactionDetails>> {
        self.load_user(user_id).await?;
        let now = Utc::now();
        let details = self.repository.transactions.borrowed_books(user_id).await?;
        Ok(details
            .into_iter()
            .map(|(t, b)| TransactionDetails::new(t, b, now))
            .collect())
    }

    /// Every transaction of the user, newest first
    pub async fn history(&self, user_id: i32) -> AppResult<Vec<TransactionDetails>> {
        self.load_user(user_id).await?;
        let now = Utc::now();
        let details = self.repository.transactions.history(user_id).await?;
        Ok(details
            .into_iter()
            .map(|(t, b)| TransactionDetails::new(t, b, now))
            .collect())
    }

    /// Recent borrow/return events for admins
    pub async fn admin_notifications(&self, limit: i64) -> AppResult<Vec<Notification>> {
        self.repository.transactions.notifications(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{book::CreateBook, notification::NotificationKind, user::{NewUser, Role}},
        repository::{memory::MemoryStore, MockBookStore, MockTransactionStore, MockUserStore},
    };
    use std::sync::Arc;

    fn policy(borrow_limit: i64) -> LoanPolicy {
        LoanPolicy { borrow_limit, loan_period: Duration::days(14) }
    }

    struct Fixture {
        repository: Repository,
        service: TransactionsService,
    }

    impl Fixture {
        fn new(borrow_limit: i64) -> Self {
            let repository = Repository::from_memory(MemoryStore::new());
            let service = TransactionsService::new(repository.clone(), policy(borrow_limit));
            Self { repository, service }
        }

        async fn user(&self, name: &str) -> i32 {
            self.repository
                .users
                .create(&NewUser {
                    username: name.to_string(),
                    email: format!("{}@example.com", name),
                    password_hash: "x".to_string(),
                    role: Role::Member,
                })
                .await
                .unwrap()
                .id
        }

        async fn book(&self, copies: i32) -> i32 {
            self.repository
                .books
                .create(&CreateBook {
                    title: format!("Book with {} copies", copies),
                    author: "Anon".to_string(),
                    description: None,
                    isbn: None,
                    category: "Fiction".to_string(),
                    total_copies: copies,
                })
                .await
                .unwrap()
                .id
        }

        async fn available(&self, book_id: i32) -> i32 {
            self.repository.books.get(book_id).await.unwrap().unwrap().available_copies
        }
    }

    #[tokio::test]
    async fn single_copy_scenario() {
        let fx = Fixture::new(3);
        let first = fx.user("first").await;
        let second = fx.user("second").await;
        let book = fx.book(1).await;

        fx.service.borrow(first, book).await.unwrap();
        assert_eq!(fx.available(book).await, 0);

        let err = fx.service.borrow(second, book).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));

        let returned = fx.service.return_book(first, book).await.unwrap();
        assert!(returned.returned_at.is_some());
        assert_eq!(fx.available(book).await, 1);
    }

    #[tokio::test]
    async fn due_date_is_borrow_time_plus_loan_period() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(2).await;
        let now = Utc::now();

        let transaction = fx.service.borrow_at(user, book, now).await.unwrap();
        assert_eq!(transaction.borrowed_at, now);
        assert_eq!(transaction.due_at, now + Duration::days(14));
        assert!(transaction.is_open());
    }

    #[tokio::test]
    async fn borrow_then_return_restores_copies() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(4).await;
        let before = fx.available(book).await;

        fx.service.borrow(user, book).await.unwrap();
        assert_eq!(fx.available(book).await, before - 1);
        fx.service.return_book(user, book).await.unwrap();
        assert_eq!(fx.available(book).await, before);
    }

    #[tokio::test]
    async fn duplicate_open_borrow_is_rejected() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(5).await;

        fx.service.borrow(user, book).await.unwrap();
        let err = fx.service.borrow(user, book).await.unwrap_err();
        assert!(matches!(err, AppError::Duplicate(_)));
        assert_eq!(fx.available(book).await, 4);

        // Allowed again once returned
        fx.service.return_book(user, book).await.unwrap();
        fx.service.borrow(user, book).await.unwrap();
    }

    #[tokio::test]
    async fn borrow_limit_is_enforced() {
        let fx = Fixture::new(2);
        let user = fx.user("reader").await;
        let books = [fx.book(1).await, fx.book(1).await, fx.book(1).await];

        fx.service.borrow(user, books[0]).await.unwrap();
        fx.service.borrow(user, books[1]).await.unwrap();
        let err = fx.service.borrow(user, books[2]).await.unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));
        assert_eq!(fx.available(books[2]).await, 1);
    }

    #[tokio::test]
    async fn missing_user_or_book_is_not_found() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(1).await;

        assert!(matches!(
            fx.service.borrow(999, book).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            fx.service.borrow(user, 999).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn return_without_open_transaction_is_not_found() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(1).await;

        let err = fx.service.return_book(user, book).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        fx.service.borrow(user, book).await.unwrap();
        fx.service.return_book(user, book).await.unwrap();
        let err = fx.service.return_book(user, book).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(fx.available(book).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_borrows_of_last_copy_lend_exactly_once() {
        let fx = Fixture::new(3);
        let book = fx.book(1).await;
        let mut users = Vec::new();
        for i in 0..16 {
            users.push(fx.user(&format!("reader{}", i)).await);
        }

        let service = Arc::new(fx.service.clone());
        let handles: Vec<_> = users
            .into_iter()
            .map(|user| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.borrow(user, book).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, AppError::Unavailable(_))),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(fx.available(book).await, 0);
    }

    #[tokio::test]
    async fn copies_stay_within_bounds_under_mixed_traffic() {
        let fx = Fixture::new(5);
        let book = fx.book(3).await;
        let mut users = Vec::new();
        for i in 0..8 {
            users.push(fx.user(&format!("reader{}", i)).await);
        }

        for round in 0..4 {
            for (i, &user) in users.iter().enumerate() {
                if (i + round) % 2 == 0 {
                    let _ = fx.service.borrow(user, book).await;
                } else {
                    let _ = fx.service.return_book(user, book).await;
                }
                let snapshot = fx.repository.books.get(book).await.unwrap().unwrap();
                assert!(snapshot.available_copies >= 0);
                assert!(snapshot.available_copies <= snapshot.total_copies);
            }
        }
    }

    #[tokio::test]
    async fn borrowed_set_and_notifications_follow_transactions() {
        let fx = Fixture::new(3);
        let user = fx.user("reader").await;
        let book = fx.book(2).await;

        fx.service.borrow(user, book).await.unwrap();
        let holder = fx.repository.users.get(user).await.unwrap().unwrap();
        assert_eq!(holder.borrowed_book_ids, vec![book]);
        assert_eq!(fx.service.borrowed_books(user).await.unwrap().len(), 1);

        fx.service.return_book(user, book).await.unwrap();
        let holder = fx.repository.users.get(user).await.unwrap().unwrap();
        assert!(holder.borrowed_book_ids.is_empty());
        assert!(fx.service.borrowed_books(user).await.unwrap().is_empty());
        assert_eq!(fx.service.history(user).await.unwrap().len(), 1);

        let notifications = fx.service.admin_notifications(10).await.unwrap();
        let kinds: Vec<_> = notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Return, NotificationKind::Borrow]);
        assert_eq!(notifications[0].username, "reader");
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_database_error() {
        let mut users = MockUserStore::new();
        users
            .expect_get()
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolTimedOut)));
        let mut transactions = MockTransactionStore::new();
        transactions.expect_borrow().never();

        let repository = Repository {
            books: Arc::new(MockBookStore::new()),
            users: Arc::new(users),
            transactions: Arc::new(transactions),
        };
        let service = TransactionsService::new(repository, policy(3));

        let err = service.borrow(1, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn race_lost_after_validation_reports_store_verdict() {
        let now = Utc::now();
        let mut users = MockUserStore::new();
        users.expect_get().returning(move |id| {
            Ok(Some(
                crate::models::user::UserRow {
                    id,
                    username: "reader".into(),
                    email: "reader@example.com".into(),
                    password_hash: String::new(),
                    role: Role::Member,
                    created_at: now,
                    updated_at: now,
                }
                .into_user(Vec::new()),
            ))
        });
        let mut books = MockBookStore::new();
        books.expect_get().returning(move |id| {
            Ok(Some(Book {
                id,
                title: "Dune".into(),
                author: "Frank Herbert".into(),
                description: None,
                isbn: None,
                category: "Fiction".into(),
                total_copies: 1,
                available_copies: 1,
                created_at: now,
                updated_at: now,
            }))
        });
        let mut transactions = MockTransactionStore::new();
        transactions.expect_open_for_user().returning(|_| Ok(Vec::new()));
        // Another request took the last copy between snapshot and write
        transactions
            .expect_borrow()
            .times(1)
            .returning(|_| Err(AppError::Unavailable("no copies".into())));

        let repository = Repository {
            books: Arc::new(books),
            users: Arc::new(users),
            transactions: Arc::new(transactions),
        };
        let service = TransactionsService::new(repository, policy(3));

        let err = service.borrow(7, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable(_)));
    }
}
