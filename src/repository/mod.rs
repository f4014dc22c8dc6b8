//! Repository layer for database operations

pub mod books;
pub mod bookshelves;
pub mod borrows;
pub mod categories;
pub mod copies;
pub mod fines;
pub mod inventory;
pub mod users;

use sqlx::{Pool, Postgres};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub categories: categories::CategoriesRepository,
    pub bookshelves: bookshelves::BookshelvesRepository,
    pub copies: copies::CopiesRepository,
    pub inventory: inventory::InventoryRepository,
    pub borrows: borrows::BorrowsRepository,
    pub fines: fines::FinesRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            categories: categories::CategoriesRepository::new(pool.clone()),
            bookshelves: bookshelves::BookshelvesRepository::new(pool.clone()),
            copies: copies::CopiesRepository::new(pool.clone()),
            inventory: inventory::InventoryRepository::new(pool.clone()),
            borrows: borrows::BorrowsRepository::new(pool.clone()),
            fines: fines::FinesRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }
}
