//! Catalog, inventory-correction and fine-ledger tests

mod common;

use athenaeum_server::{
    error::AppError,
    models::{
        book::{CreateBook, UpdateBook},
        bookshelf::CreateBookshelf,
        category::CreateCategory,
        fine::{CreateFine, FineQuery, FineReason, UpdateFine},
        inventory::UpdateInventory,
    },
};
use common::*;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Book creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn create_book_registers_inventory_and_copies(pool: PgPool) {
    let services = build_services(pool.clone());
    let book = seed_book(&services, "9780306406157", 75_000, 4).await;

    let (total, available, borrowed, damaged, lost) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed, damaged, lost), (4, 4, 0, 0, 0));

    let copies = services.catalog.list_copies(book.id).await.unwrap();
    assert_eq!(copies.len(), 4);
    assert_eq!(copies[0].barcode, format!("BC-6157-{}-001", book.id));
    assert_eq!(copies[3].barcode, format!("BC-6157-{}-004", book.id));

    // Barcodes are unique across the batch
    let mut barcodes: Vec<_> = copies.iter().map(|c| c.barcode.clone()).collect();
    barcodes.dedup();
    assert_eq!(barcodes.len(), 4);
}

#[sqlx::test(migrations = "./migrations")]
async fn create_book_rejects_duplicate_isbn(pool: PgPool) {
    let services = build_services(pool.clone());
    seed_book(&services, "9780306406157", 75_000, 1).await;

    let err = services
        .catalog
        .create_book(&CreateBook {
            title: "Another".to_string(),
            isbn: "9780306406157".to_string(),
            author: None,
            publisher: None,
            publish_year: None,
            description: None,
            price: 10_000,
            category_ids: vec![],
            bookshelf_id: None,
            quantity: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn create_book_rejects_malformed_isbn(pool: PgPool) {
    let services = build_services(pool.clone());

    let err = services
        .catalog
        .create_book(&CreateBook {
            title: "Bad ISBN".to_string(),
            isbn: "978-0306406157".to_string(),
            author: None,
            publisher: None,
            publish_year: None,
            description: None,
            price: 10_000,
            category_ids: vec![],
            bookshelf_id: None,
            quantity: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn book_search_filters_by_title(pool: PgPool) {
    let services = build_services(pool.clone());
    seed_book(&services, "9780306406157", 10_000, 1).await;
    seed_book(&services, "9780140449136", 10_000, 1).await;

    let (books, total) = services
        .catalog
        .search_books(&athenaeum_server::models::book::BookQuery {
            title: Some("9780140449136".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(books[0].isbn, "9780140449136");
}

// ---------------------------------------------------------------------------
// Book deletion guard
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn delete_book_blocked_while_requests_active(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 10_000, 1).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services.catalog.delete_book(book.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Once the request reaches a terminal state the book can go, taking
    // inventory and copies with it
    services
        .borrows
        .decline(details.record.id, staff, None)
        .await
        .unwrap();
    services.catalog.delete_book(book.id).await.unwrap();

    let copies_left: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM book_copies WHERE book_id = $1")
            .bind(book.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(copies_left, 0);

    let inventory_left: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM inventories WHERE book_id = $1")
            .bind(book.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(inventory_left, 0);

    // The terminal record stays as audit trail
    let records: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE book_id = $1")
            .bind(book.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(records, 1);
}

// ---------------------------------------------------------------------------
// Manual inventory correction
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn inventory_correction_enforces_sum_invariant(pool: PgPool) {
    let services = build_services(pool.clone());
    let book = seed_book(&services, "9780306406157", 10_000, 5).await;

    let err = services
        .catalog
        .update_inventory(
            book.id,
            &UpdateInventory {
                total: Some(10),
                available: None,
                borrowed: None,
                damaged: None,
                lost: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Untouched on rejection
    assert_eq!(inventory_counters(&pool, book.id).await.0, 5);

    let updated = services
        .catalog
        .update_inventory(
            book.id,
            &UpdateInventory {
                total: Some(6),
                available: Some(6),
                borrowed: None,
                damaged: None,
                lost: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.total, 6);
    assert_eq!(updated.available, 6);
    assert_inventory_consistent(&pool, book.id).await;
}

// ---------------------------------------------------------------------------
// Categories and bookshelves
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn category_names_are_unique(pool: PgPool) {
    let services = build_services(pool.clone());
    services
        .catalog
        .create_category(&CreateCategory {
            name: "Science".to_string(),
            description: None,
        })
        .await
        .unwrap();

    let err = services
        .catalog
        .create_category(&CreateCategory {
            name: "science".to_string(),
            description: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn linked_category_cannot_be_deleted(pool: PgPool) {
    let services = build_services(pool.clone());
    let category = services
        .catalog
        .create_category(&CreateCategory {
            name: "History".to_string(),
            description: None,
        })
        .await
        .unwrap();

    services
        .catalog
        .create_book(&CreateBook {
            title: "Linked".to_string(),
            isbn: "9780306406157".to_string(),
            author: None,
            publisher: None,
            publish_year: None,
            description: None,
            price: 10_000,
            category_ids: vec![category.id],
            bookshelf_id: None,
            quantity: 1,
        })
        .await
        .unwrap();

    let err = services.catalog.delete_category(category.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn occupied_bookshelf_cannot_be_deleted(pool: PgPool) {
    let services = build_services(pool.clone());
    let shelf = services
        .catalog
        .create_bookshelf(&CreateBookshelf {
            code: "A-01".to_string(),
            location: Some("Ground floor".to_string()),
            description: None,
        })
        .await
        .unwrap();

    services
        .catalog
        .create_book(&CreateBook {
            title: "Shelved".to_string(),
            isbn: "9780306406157".to_string(),
            author: None,
            publisher: None,
            publish_year: None,
            description: None,
            price: 10_000,
            category_ids: vec![],
            bookshelf_id: Some(shelf.id),
            quantity: 1,
        })
        .await
        .unwrap();

    let err = services.catalog.delete_bookshelf(shelf.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn update_book_replaces_category_links(pool: PgPool) {
    let services = build_services(pool.clone());
    let cat_a = services
        .catalog
        .create_category(&CreateCategory {
            name: "Poetry".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let cat_b = services
        .catalog
        .create_category(&CreateCategory {
            name: "Drama".to_string(),
            description: None,
        })
        .await
        .unwrap();

    let book = services
        .catalog
        .create_book(&CreateBook {
            title: "Collected Works".to_string(),
            isbn: "9780306406157".to_string(),
            author: None,
            publisher: None,
            publish_year: None,
            description: None,
            price: 10_000,
            category_ids: vec![cat_a.id],
            bookshelf_id: None,
            quantity: 1,
        })
        .await
        .unwrap();

    let updated = services
        .catalog
        .update_book(
            book.id,
            &UpdateBook {
                title: None,
                author: None,
                publisher: None,
                publish_year: None,
                description: None,
                price: None,
                category_ids: Some(vec![cat_b.id]),
                bookshelf_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.categories.len(), 1);
    assert_eq!(updated.categories[0].id, cat_b.id);
}

// ---------------------------------------------------------------------------
// Fine ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn paid_fine_is_immutable(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;

    let fine = services
        .fines
        .create_manual(
            staff,
            &CreateFine {
                user_id: user,
                borrow_id: None,
                reason: FineReason::Damaged,
                amount: 20_000,
                note: Some("torn cover".to_string()),
            },
        )
        .await
        .unwrap();

    let paid = services.fines.mark_paid(fine.id, staff, None).await.unwrap();
    assert!(paid.paid);
    assert!(paid.paid_at.is_some());

    let err = services.fines.mark_paid(fine.id, staff, None).await.unwrap_err();
    assert!(matches!(err, AppError::ConflictFinancial(_)));

    let err = services
        .fines
        .update(
            fine.id,
            &UpdateFine {
                amount: Some(5_000),
                reason: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ConflictFinancial(_)));

    let err = services.fines.delete(fine.id).await.unwrap_err();
    assert!(matches!(err, AppError::ConflictFinancial(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn unpaid_fine_can_be_adjusted_and_deleted(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;

    let fine = services
        .fines
        .create_manual(
            staff,
            &CreateFine {
                user_id: user,
                borrow_id: None,
                reason: FineReason::Overdue,
                amount: 10_000,
                note: None,
            },
        )
        .await
        .unwrap();

    let adjusted = services
        .fines
        .update(
            fine.id,
            &UpdateFine {
                amount: Some(8_000),
                reason: None,
                note: Some("waived two days".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(adjusted.amount, 8_000);

    services.fines.delete(fine.id).await.unwrap();

    let (fines, total) = services
        .fines
        .list(&FineQuery {
            user_id: Some(user),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(fines.is_empty());
    assert_eq!(total, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn user_fine_summary_splits_paid_and_unpaid(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;

    let first = services
        .fines
        .create_manual(
            staff,
            &CreateFine {
                user_id: user,
                borrow_id: None,
                reason: FineReason::Overdue,
                amount: 10_000,
                note: None,
            },
        )
        .await
        .unwrap();
    services
        .fines
        .create_manual(
            staff,
            &CreateFine {
                user_id: user,
                borrow_id: None,
                reason: FineReason::Damaged,
                amount: 30_000,
                note: None,
            },
        )
        .await
        .unwrap();
    services.fines.mark_paid(first.id, staff, None).await.unwrap();

    let (fines, summary) = services.fines.list_by_user(user).await.unwrap();
    assert_eq!(fines.len(), 2);
    assert_eq!(summary.total_fines, 2);
    assert_eq!(summary.total_amount, 40_000);
    assert_eq!(summary.paid_amount, 10_000);
    assert_eq!(summary.unpaid_amount, 30_000);
}
