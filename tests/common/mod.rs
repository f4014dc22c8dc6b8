//! Shared helpers for the database-backed test suite
#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use athenaeum_server::{
    config::PolicyConfig,
    models::{
        book::{Book, CreateBook},
        borrow::CreateBorrowRequest,
    },
    repository::Repository,
    services::Services,
};

/// Build the service stack on the test pool with the default policy
pub fn build_services(pool: PgPool) -> Services {
    Services::new(Repository::new(pool), PolicyConfig::default())
}

/// Insert a user and return its id
pub async fn seed_user(pool: &PgPool, student_code: &str, role: &str) -> i32 {
    sqlx::query_scalar::<_, i32>(
        "INSERT INTO users (student_code, name, role) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(student_code)
    .bind(format!("Test {}", student_code))
    .bind(role)
    .fetch_one(pool)
    .await
    .expect("failed to seed user")
}

/// Create a book with copies through the catalog service
pub async fn seed_book(services: &Services, isbn: &str, price: i64, quantity: i32) -> Book {
    services
        .catalog
        .create_book(&CreateBook {
            title: format!("Book {}", isbn),
            isbn: isbn.to_string(),
            author: Some("Author".to_string()),
            publisher: None,
            publish_year: Some(2020),
            description: None,
            price,
            category_ids: vec![],
            bookshelf_id: None,
            quantity,
        })
        .await
        .expect("failed to seed book")
}

pub fn due_in(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

pub fn borrow_request(book_id: i32, quantity: i32) -> CreateBorrowRequest {
    CreateBorrowRequest {
        book_id,
        quantity,
        due_date: due_in(14),
        is_read_on_site: false,
        notes: None,
    }
}

/// Assert the inventory sum invariant and that outstanding copies never
/// exceed the total
pub async fn assert_inventory_consistent(pool: &PgPool, book_id: i32) {
    let (total, available, borrowed, damaged, lost): (i32, i32, i32, i32, i32) =
        sqlx::query_as(
            "SELECT total, available, borrowed, damaged, lost FROM inventories WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(pool)
        .await
        .expect("inventory row missing");

    assert_eq!(
        available + borrowed + damaged + lost,
        total,
        "inventory sum invariant violated for book {}",
        book_id
    );

    let outstanding: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM book_copies WHERE book_id = $1 AND status IN ('pending', 'borrowed')",
    )
    .bind(book_id)
    .fetch_one(pool)
    .await
    .expect("copy count query failed");

    assert!(
        outstanding <= total as i64,
        "outstanding copies exceed inventory total for book {}",
        book_id
    );
}

/// Read the inventory counters as a tuple
pub async fn inventory_counters(pool: &PgPool, book_id: i32) -> (i32, i32, i32, i32, i32) {
    sqlx::query_as(
        "SELECT total, available, borrowed, damaged, lost FROM inventories WHERE book_id = $1",
    )
    .bind(book_id)
    .fetch_one(pool)
    .await
    .expect("inventory row missing")
}

/// Backdate a borrowed record (and its copies) so a return is overdue by
/// the given number of whole days
pub async fn backdate_due_date(pool: &PgPool, borrow_id: i32, days: i64) {
    // One hour inside the final day keeps ceil() at exactly `days`
    let hours = days * 24 - 1;
    sqlx::query(
        "UPDATE borrow_records SET due_date = NOW() - ($2 || ' hours')::interval WHERE id = $1",
    )
    .bind(borrow_id)
    .bind(hours.to_string())
    .execute(pool)
    .await
    .expect("failed to backdate record");

    sqlx::query(
        r#"
        UPDATE book_copies SET due_date = NOW() - ($2 || ' hours')::interval
        WHERE id IN (SELECT copy_id FROM borrow_record_copies WHERE borrow_id = $1)
        "#,
    )
    .bind(borrow_id)
    .bind(hours.to_string())
    .execute(pool)
    .await
    .expect("failed to backdate copies");
}
