//! Catalog management service

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, Category, CreateBook, SuggestionQuery, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Resolve a label to its canonical spelling in the category set
    async fn canonical_category(&self, name: &str) -> AppResult<String> {
        self.repository
            .books
            .find_category(name.trim())
            .await?
            .map(|c| c.name)
            .ok_or_else(|| AppError::Validation(format!("Category '{}' does not exist", name.trim())))
    }

    /// List books with pagination
    pub async fn list_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        query.validate()?;
        self.repository.books.list(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository
            .books
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn create_book(&self, mut book: CreateBook) -> AppResult<Book> {
        book.normalize();
        book.validate()?;
        book.category = self.canonical_category(&book.category).await?;

        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, "Book '{}' added to catalog", created.title);
        Ok(created)
    }

    /// Partial update of a book
    pub async fn edit_book(&self, id: i32, mut changes: UpdateBook) -> AppResult<Book> {
        changes.normalize();
        changes.validate()?;
        if changes.is_empty() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }

        let current = self.get_book(id).await?;
        if let Some(total) = changes.total_copies {
            if total < current.on_loan() {
                return Err(AppError::Validation(format!(
                    "Total copies cannot be less than the {} copies currently on loan",
                    current.on_loan()
                )));
            }
        }
        if let Some(ref category) = changes.category {
            changes.category = Some(self.canonical_category(category).await?);
        }

        let updated = self.repository.books.update(id, &changes).await?;
        tracing::info!(book_id = id, "Book updated");
        Ok(updated)
    }

    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.delete(id).await?;
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    pub async fn suggestions(&self, query: &SuggestionQuery) -> AppResult<Vec<Book>> {
        query.validate()?;
        self.repository.books.suggestions(query.limit.unwrap_or(5)).await
    }

    pub async fn categories(&self) -> AppResult<Vec<Category>> {
        self.repository.books.categories().await
    }

    /// Append a label to the category set
    pub async fn add_category(&self, name: &str) -> AppResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Category name is required".to_string()));
        }
        if self.repository.books.find_category(name).await?.is_some() {
            return Err(AppError::Duplicate("Category already exists".to_string()));
        }
        let category = self.repository.books.add_category(name).await?;
        tracing::info!(category_id = category.id, "Category '{}' added", category.name);
        Ok(category)
    }
}
