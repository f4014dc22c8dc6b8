//! Bookshelves repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::bookshelf::{Bookshelf, CreateBookshelf, UpdateBookshelf},
};

#[derive(Clone)]
pub struct BookshelvesRepository {
    pool: Pool<Postgres>,
}

impl BookshelvesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Bookshelf> {
        sqlx::query_as::<_, Bookshelf>("SELECT * FROM bookshelves WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bookshelf with id {} not found", id)))
    }

    pub async fn list(&self) -> AppResult<Vec<Bookshelf>> {
        let shelves =
            sqlx::query_as::<_, Bookshelf>("SELECT * FROM bookshelves ORDER BY code")
                .fetch_all(&self.pool)
                .await?;
        Ok(shelves)
    }

    pub async fn code_exists(&self, code: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = if let Some(id) = exclude_id {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM bookshelves WHERE LOWER(code) = LOWER($1) AND id != $2)",
            )
            .bind(code)
            .bind(id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM bookshelves WHERE LOWER(code) = LOWER($1))",
            )
            .bind(code)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(exists)
    }

    pub async fn create(&self, shelf: &CreateBookshelf) -> AppResult<Bookshelf> {
        let created = sqlx::query_as::<_, Bookshelf>(
            "INSERT INTO bookshelves (code, location, description) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&shelf.code)
        .bind(&shelf.location)
        .bind(&shelf.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    pub async fn update(&self, id: i32, update: &UpdateBookshelf) -> AppResult<Bookshelf> {
        sqlx::query_as::<_, Bookshelf>(
            r#"
            UPDATE bookshelves
            SET code = COALESCE($2, code),
                location = COALESCE($3, location),
                description = COALESCE($4, description)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.code)
        .bind(&update.location)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bookshelf with id {} not found", id)))
    }

    /// True when any book is placed on the shelf
    pub async fn is_in_use(&self, id: i32) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE bookshelf_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bookshelves WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Bookshelf with id {} not found",
                id
            )));
        }
        Ok(())
    }
}
