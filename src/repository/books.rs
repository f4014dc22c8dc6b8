//! Books repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        category::Category,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID with its categories
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        let mut book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        book.categories = self.get_categories(id).await?;
        Ok(book)
    }

    /// Categories linked to a book
    pub async fn get_categories(&self, book_id: i32) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT c.* FROM categories c
            JOIN book_categories bc ON bc.category_id = c.id
            WHERE bc.book_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    /// Check if a book with this ISBN already exists
    pub async fn isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
                .bind(isbn)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Search books with filters, paginated
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(10).clamp(1, 100);

        let mut conditions = vec!["TRUE".to_string()];
        let mut param = 0;
        if query.title.is_some() {
            param += 1;
            conditions.push(format!("b.title ILIKE ${}", param));
        }
        if query.author.is_some() {
            param += 1;
            conditions.push(format!("b.author ILIKE ${}", param));
        }
        if query.category_id.is_some() {
            param += 1;
            conditions.push(format!(
                "EXISTS(SELECT 1 FROM book_categories bc WHERE bc.book_id = b.id AND bc.category_id = ${})",
                param
            ));
        }
        if query.bookshelf_id.is_some() {
            param += 1;
            conditions.push(format!("b.bookshelf_id = ${}", param));
        }
        let where_clause = conditions.join(" AND ");

        let list_query = format!(
            "SELECT b.* FROM books b WHERE {} ORDER BY b.id LIMIT {} OFFSET {}",
            where_clause,
            per_page,
            (page - 1) * per_page
        );
        let count_query = format!("SELECT COUNT(*) FROM books b WHERE {}", where_clause);

        let mut rows = sqlx::query_as::<_, Book>(&list_query);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(ref title) = query.title {
            let pattern = format!("%{}%", title);
            rows = rows.bind(pattern.clone());
            count = count.bind(pattern);
        }
        if let Some(ref author) = query.author {
            let pattern = format!("%{}%", author);
            rows = rows.bind(pattern.clone());
            count = count.bind(pattern);
        }
        if let Some(category_id) = query.category_id {
            rows = rows.bind(category_id);
            count = count.bind(category_id);
        }
        if let Some(bookshelf_id) = query.bookshelf_id {
            rows = rows.bind(bookshelf_id);
            count = count.bind(bookshelf_id);
        }

        let books = rows.fetch_all(&self.pool).await?;
        let total = count.fetch_one(&self.pool).await?;
        Ok((books, total))
    }

    /// Insert the book row. Inventory and copies are created by the
    /// catalog service in the same transaction.
    pub async fn create(&self, conn: &mut PgConnection, book: &CreateBook) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (isbn, title, author, publisher, publish_year, description, price, bookshelf_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.publish_year)
        .bind(&book.description)
        .bind(book.price)
        .bind(book.bookshelf_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(created)
    }

    /// Replace the category links of a book
    pub async fn set_categories(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        category_ids: &[i32],
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM book_categories WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut *conn)
            .await?;
        for category_id in category_ids {
            sqlx::query(
                "INSERT INTO book_categories (book_id, category_id) VALUES ($1, $2)",
            )
            .bind(book_id)
            .bind(category_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Update the bibliographic fields of a book
    pub async fn update(&self, id: i32, update: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books
            SET title = COALESCE($2, title),
                author = COALESCE($3, author),
                publisher = COALESCE($4, publisher),
                publish_year = COALESCE($5, publish_year),
                description = COALESCE($6, description),
                price = COALESCE($7, price),
                bookshelf_id = COALESCE($8, bookshelf_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.author)
        .bind(&update.publisher)
        .bind(update.publish_year)
        .bind(&update.description)
        .bind(update.price)
        .bind(update.bookshelf_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;

        if let Some(ref category_ids) = update.category_ids {
            self.set_categories(&mut tx, id, category_ids).await?;
        }

        tx.commit().await?;

        book.categories = self.get_categories(id).await?;
        Ok(book)
    }

    /// Delete a book. Inventory and copies cascade with the row.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}
