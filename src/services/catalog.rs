//! Catalog management service: books, categories and bookshelves.
//!
//! Book creation registers the inventory row and the physical copy batch
//! in the same transaction as the book itself.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        bookshelf::{Bookshelf, CreateBookshelf, UpdateBookshelf},
        category::{Category, CreateCategory, UpdateCategory},
        copy::BookCopy,
        inventory::{Inventory, UpdateInventory},
    },
    repository::Repository,
};

/// ISBN-10 (trailing check digit may be X) or ISBN-13, digits only
static ISBN_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{9}[\dX]|\d{13})$").expect("valid ISBN regex"));

/// Derive the barcode batch for a book's copies. The book id keeps
/// barcodes unique across books sharing the same ISBN tail.
pub fn derive_barcodes(isbn: &str, book_id: i32, quantity: i32) -> Vec<String> {
    let tail = &isbn[isbn.len().saturating_sub(4)..];
    (1..=quantity)
        .map(|seq| format!("BC-{}-{}-{:03}", tail, book_id, seq))
        .collect()
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get book by ID with its categories
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    /// Create a book together with its inventory and copy batch
    pub async fn create_book(&self, request: &CreateBook) -> AppResult<Book> {
        if !ISBN_FORMAT.is_match(&request.isbn) {
            return Err(AppError::Validation(
                "Invalid ISBN format. ISBN should be either 10 or 13 digits.".to_string(),
            ));
        }
        if self.repository.books.isbn_exists(&request.isbn).await? {
            return Err(AppError::Conflict(
                "A book with this ISBN already exists".to_string(),
            ));
        }
        if let Some(shelf_id) = request.bookshelf_id {
            self.repository.bookshelves.get_by_id(shelf_id).await?;
        }
        for category_id in &request.category_ids {
            self.repository.categories.get_by_id(*category_id).await?;
        }

        let mut tx = self.repository.pool.begin().await?;

        let mut book = self.repository.books.create(&mut tx, request).await?;
        self.repository
            .books
            .set_categories(&mut tx, book.id, &request.category_ids)
            .await?;
        self.repository
            .inventory
            .create(&mut tx, book.id, request.quantity)
            .await?;

        let barcodes = derive_barcodes(&request.isbn, book.id, request.quantity);
        self.repository
            .copies
            .create_batch(&mut tx, book.id, &barcodes)
            .await?;

        tx.commit().await?;

        tracing::info!(book_id = book.id, copies = request.quantity, "book created");

        book.categories = self.repository.books.get_categories(book.id).await?;
        Ok(book)
    }

    /// Update bibliographic fields and category links
    pub async fn update_book(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        if let Some(shelf_id) = update.bookshelf_id {
            self.repository.bookshelves.get_by_id(shelf_id).await?;
        }
        if let Some(ref category_ids) = update.category_ids {
            for category_id in category_ids {
                self.repository.categories.get_by_id(*category_id).await?;
            }
        }
        self.repository.books.update(id, update).await
    }

    /// Delete a book unless active borrow records reference it. Inventory
    /// and copies go with it.
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.get_by_id(id).await?;
        if self.repository.borrows.book_has_active_records(id).await? {
            return Err(AppError::Conflict(
                "Cannot delete the book because it is currently borrowed or has pending requests"
                    .to_string(),
            ));
        }
        self.repository.books.delete(id).await
    }

    /// Physical copies of a book
    pub async fn list_copies(&self, book_id: i32) -> AppResult<Vec<BookCopy>> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.copies.list_by_book(book_id).await
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    pub async fn list_inventories(&self) -> AppResult<Vec<Inventory>> {
        self.repository.inventory.list().await
    }

    pub async fn get_inventory(&self, book_id: i32) -> AppResult<Inventory> {
        self.repository.inventory.get_by_book(book_id).await
    }

    /// Manual staff correction, validated against the sum invariant
    pub async fn update_inventory(
        &self,
        book_id: i32,
        update: &UpdateInventory,
    ) -> AppResult<Inventory> {
        self.repository.books.get_by_id(book_id).await?;
        self.repository.inventory.set_absolute(book_id, update).await
    }

    // =========================================================================
    // Categories
    // =========================================================================

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list().await
    }

    pub async fn create_category(&self, request: &CreateCategory) -> AppResult<Category> {
        if self.repository.categories.name_exists(&request.name, None).await? {
            return Err(AppError::Conflict(
                "A category with this name already exists".to_string(),
            ));
        }
        self.repository.categories.create(request).await
    }

    pub async fn update_category(&self, id: i32, update: &UpdateCategory) -> AppResult<Category> {
        if let Some(ref name) = update.name {
            if self.repository.categories.name_exists(name, Some(id)).await? {
                return Err(AppError::Conflict(
                    "A category with this name already exists".to_string(),
                ));
            }
        }
        self.repository.categories.update(id, update).await
    }

    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.categories.get_by_id(id).await?;
        if self.repository.categories.is_in_use(id).await? {
            return Err(AppError::Conflict(
                "Category is linked to books and cannot be deleted".to_string(),
            ));
        }
        self.repository.categories.delete(id).await
    }

    // =========================================================================
    // Bookshelves
    // =========================================================================

    pub async fn list_bookshelves(&self) -> AppResult<Vec<Bookshelf>> {
        self.repository.bookshelves.list().await
    }

    pub async fn create_bookshelf(&self, request: &CreateBookshelf) -> AppResult<Bookshelf> {
        if self.repository.bookshelves.code_exists(&request.code, None).await? {
            return Err(AppError::Conflict(
                "A bookshelf with this code already exists".to_string(),
            ));
        }
        self.repository.bookshelves.create(request).await
    }

    pub async fn update_bookshelf(
        &self,
        id: i32,
        update: &UpdateBookshelf,
    ) -> AppResult<Bookshelf> {
        if let Some(ref code) = update.code {
            if self.repository.bookshelves.code_exists(code, Some(id)).await? {
                return Err(AppError::Conflict(
                    "A bookshelf with this code already exists".to_string(),
                ));
            }
        }
        self.repository.bookshelves.update(id, update).await
    }

    pub async fn delete_bookshelf(&self, id: i32) -> AppResult<()> {
        self.repository.bookshelves.get_by_id(id).await?;
        if self.repository.bookshelves.is_in_use(id).await? {
            return Err(AppError::Conflict(
                "Bookshelf still holds books and cannot be deleted".to_string(),
            ));
        }
        self.repository.bookshelves.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isbn_format_accepts_10_and_13_digit_forms() {
        assert!(ISBN_FORMAT.is_match("0306406152"));
        assert!(ISBN_FORMAT.is_match("043942089X"));
        assert!(ISBN_FORMAT.is_match("9780306406157"));
    }

    #[test]
    fn isbn_format_rejects_other_shapes() {
        assert!(!ISBN_FORMAT.is_match(""));
        assert!(!ISBN_FORMAT.is_match("978-0306406157"));
        assert!(!ISBN_FORMAT.is_match("12345"));
        assert!(!ISBN_FORMAT.is_match("97803064061579"));
        assert!(!ISBN_FORMAT.is_match("X306406152"));
    }

    #[test]
    fn barcodes_use_isbn_tail_book_id_and_sequence() {
        let barcodes = derive_barcodes("9780306406157", 42, 3);
        assert_eq!(
            barcodes,
            vec!["BC-6157-42-001", "BC-6157-42-002", "BC-6157-42-003"]
        );
    }

    #[test]
    fn barcode_batch_is_empty_for_zero_quantity() {
        assert!(derive_barcodes("9780306406157", 7, 0).is_empty());
    }
}
