//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Book model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub isbn: Option<String>,
    /// Label from the category set
    pub category: String,
    pub total_copies: i32,
    /// Always within `0..=total_copies`
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Copies currently lent out
    pub fn on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

/// Category label from the controlled set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author is required"))]
    pub author: String,
    pub description: Option<String>,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10 to 17 characters"))]
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: i32,
}

/// Partial book update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 10, max = 17, message = "ISBN must be 10 to 17 characters"))]
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Category cannot be empty"))]
    pub category: Option<String>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: Option<i32>,
}

impl CreateBook {
    /// Trim surrounding whitespace; blank optional fields become absent
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.title);
        trim_in_place(&mut self.author);
        trim_in_place(&mut self.category);
        self.description = non_blank(self.description.take());
        self.isbn = non_blank(self.isbn.take());
    }
}

impl UpdateBook {
    /// Trim surrounding whitespace so blank values fail validation
    pub fn normalize(&mut self) {
        for field in [&mut self.title, &mut self.author, &mut self.category, &mut self.isbn] {
            if let Some(value) = field.as_mut() {
                trim_in_place(value);
            }
        }
        if let Some(description) = self.description.as_mut() {
            trim_in_place(description);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.description.is_none()
            && self.isbn.is_none()
            && self.category.is_none()
            && self.total_copies.is_none()
    }
}

pub(crate) fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Create category request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 64, message = "Category name is required"))]
    pub category: String,
}

/// Book listing parameters
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    #[validate(range(min = 0, message = "Offset cannot be negative"))]
    pub offset: Option<i64>,
    /// Only books in this category
    pub category: Option<String>,
}

impl BookQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).min(MAX_PAGE_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// Suggestion listing parameters
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SuggestionQuery {
    #[validate(range(min = 1, max = 20, message = "Limit must be between 1 and 20"))]
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_book_rejects_zero_copies_and_blank_title() {
        let book = CreateBook {
            title: String::new(),
            author: "Ursula K. Le Guin".into(),
            description: None,
            isbn: None,
            category: "Fiction".into(),
            total_copies: 0,
        };
        let errors = book.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("total_copies"));
    }

    #[test]
    fn book_query_bounds() {
        let query = BookQuery { limit: Some(0), ..Default::default() };
        assert!(query.validate().is_err());

        let query = BookQuery { offset: Some(-1), ..Default::default() };
        assert!(query.validate().is_err());

        let query = BookQuery::default();
        assert!(query.validate().is_ok());
        assert_eq!(query.limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn serializes_camel_case() {
        let now = Utc::now();
        let book = Book {
            id: 1,
            title: "Dune".into(),
            author: "Frank Herbert".into(),
            description: None,
            isbn: None,
            category: "Fiction".into(),
            total_copies: 3,
            available_copies: 2,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["availableCopies"], 2);
        assert_eq!(json["totalCopies"], 3);
        assert_eq!(book.on_loan(), 1);
    }
}
