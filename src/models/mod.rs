//! Data models for Hello Books

pub mod book;
pub mod notification;
pub mod transaction;
pub mod user;

// Re-export commonly used types
pub use book::{Book, Category};
pub use notification::{Notification, NotificationKind};
pub use transaction::{Transaction, TransactionDetails};
pub use user::{Role, User};
