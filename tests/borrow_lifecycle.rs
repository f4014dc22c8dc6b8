//! Lifecycle tests for the borrow engine: state machine guards, inventory
//! consistency, copy allocation, fines and concurrency behaviour.

mod common;

use athenaeum_server::{
    error::AppError,
    models::{
        borrow::{BorrowStatus, CopyConditionEntry, ReturnRequest},
        copy::{CopyCondition, CopyStatus},
        fine::FineReason,
        user::Role,
    },
    services::Services,
};
use common::*;
use sqlx::PgPool;

/// Drive a fresh request to the borrowed state
async fn borrow_flow(services: &Services, user_id: i32, staff_id: i32, book_id: i32, quantity: i32) -> i32 {
    let details = services
        .borrows
        .create_request(user_id, &borrow_request(book_id, quantity))
        .await
        .expect("create_request failed");
    let borrow_id = details.record.id;
    services.borrows.accept(borrow_id, staff_id).await.expect("accept failed");
    services
        .borrows
        .confirm_pickup(borrow_id)
        .await
        .expect("confirm_pickup failed");
    borrow_id
}

fn all_good() -> ReturnRequest {
    ReturnRequest::default()
}

// ---------------------------------------------------------------------------
// Request creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn create_request_reserves_copies_and_inventory(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 3).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 2))
        .await
        .unwrap();

    assert_eq!(details.record.status, BorrowStatus::Pending);
    assert_eq!(details.record.quantity, 2);
    assert_eq!(details.copies.len(), 2);
    assert!(details.fine.is_none());

    let (total, available, borrowed, _, _) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed), (3, 1, 2));

    // The two oldest copies are reserved for the requesting user
    let reserved: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM book_copies WHERE book_id = $1 AND status = 'pending' AND current_borrower = $2",
    )
    .bind(book.id)
    .bind(user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(reserved, 2);

    assert_inventory_consistent(&pool, book.id).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn create_request_fails_on_insufficient_inventory(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 2).await;

    let err = services
        .borrows
        .create_request(user, &borrow_request(book.id, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory(_)));

    // Nothing was reserved
    let (_, available, borrowed, _, _) = inventory_counters(&pool, book.id).await;
    assert_eq!((available, borrowed), (2, 0));
}

#[sqlx::test(migrations = "./migrations")]
async fn create_request_rejects_duplicate_active_request(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 5).await;

    services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateActiveRequest(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn create_request_rejects_past_due_date(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let mut request = borrow_request(book.id, 1);
    request.due_date = due_in(-2);
    let err = services.borrows.create_request(user, &request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn create_request_unknown_book_is_not_found(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;

    let err = services
        .borrows
        .create_request(user, &borrow_request(9999, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// State machine guards
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn accept_requires_pending_status(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 2).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();
    services
        .borrows
        .decline(details.record.id, staff, Some("out of scope"))
        .await
        .unwrap();

    let err = services.borrows.accept(details.record.id, staff).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn return_requires_borrowed_status(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 2).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services
        .borrows
        .return_books(details.record.id, staff, &all_good())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn pickup_requires_pending_pickup_status(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 2).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services.borrows.confirm_pickup(details.record.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// Decline / cancel release the reservation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn decline_releases_copies_and_inventory(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 3).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 2))
        .await
        .unwrap();
    let record = services
        .borrows
        .decline(details.record.id, staff, Some("not eligible"))
        .await
        .unwrap();

    assert_eq!(record.status, BorrowStatus::Declined);
    assert_eq!(record.notes.as_deref(), Some("not eligible"));

    let (_, available, borrowed, _, _) = inventory_counters(&pool, book.id).await;
    assert_eq!((available, borrowed), (3, 0));
    assert_inventory_consistent(&pool, book.id).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_restores_pre_request_state(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 4).await;

    let before = inventory_counters(&pool, book.id).await;
    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 2))
        .await
        .unwrap();

    let record = services
        .borrows
        .cancel(details.record.id, user, Role::User)
        .await
        .unwrap();
    assert_eq!(record.status, BorrowStatus::Cancelled);

    assert_eq!(inventory_counters(&pool, book.id).await, before);

    // Copies are available again with no borrower
    let held: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM book_copies WHERE book_id = $1 AND current_borrower IS NOT NULL",
    )
    .bind(book.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(held, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_by_stranger_is_forbidden(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let other = seed_user(&pool, "SV002", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services
        .borrows
        .cancel(details.record.id, other, Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn staff_can_cancel_pending_pickup(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();
    services.borrows.accept(details.record.id, staff).await.unwrap();

    let record = services
        .borrows
        .cancel(details.record.id, staff, Role::Staff)
        .await
        .unwrap();
    assert_eq!(record.status, BorrowStatus::Cancelled);
    assert_inventory_consistent(&pool, book.id).await;
}

// ---------------------------------------------------------------------------
// Returns and fines
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn clean_return_restores_inventory_without_fine(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 3).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 2).await;
    let details = services.borrows.return_books(borrow_id, staff, &all_good()).await.unwrap();

    assert_eq!(details.record.status, BorrowStatus::Returned);
    assert!(details.record.return_date.is_some());
    assert!(details.fine.is_none());
    assert!(details
        .copies
        .iter()
        .all(|c| c.status == Some(CopyStatus::Available)));

    let (total, available, borrowed, damaged, lost) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed, damaged, lost), (3, 3, 0, 0, 0));
}

#[sqlx::test(migrations = "./migrations")]
async fn overdue_damaged_return_assesses_combined_fine(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 100_000, 2).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 2).await;
    backdate_due_date(&pool, borrow_id, 3).await;

    let snapshot = services.borrows.get_details(borrow_id).await.unwrap().copies;
    let damaged_barcode = snapshot[0].barcode.clone();

    let details = services
        .borrows
        .return_books(
            borrow_id,
            staff,
            &ReturnRequest {
                conditions: Some(vec![CopyConditionEntry {
                    barcode: damaged_barcode,
                    condition: CopyCondition::Damaged,
                }]),
                condition: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    // 3 days late (15,000) + one damaged copy (100,000 * 0.3)
    let fine = details.fine.expect("fine expected");
    assert_eq!(fine.amount, 45_000);
    assert_eq!(fine.reason, FineReason::Damaged);
    assert!(!fine.paid);
    assert_eq!(details.record.status, BorrowStatus::Returned);
    assert_eq!(details.record.fine_id, Some(fine.id));

    let (total, available, borrowed, damaged, lost) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed, damaged, lost), (2, 1, 0, 1, 0));
    assert_inventory_consistent(&pool, book.id).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn lost_copy_dominates_status_and_reason(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 100_000, 2).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 2).await;
    backdate_due_date(&pool, borrow_id, 3).await;

    let snapshot = services.borrows.get_details(borrow_id).await.unwrap().copies;
    let lost_barcode = snapshot[0].barcode.clone();

    let details = services
        .borrows
        .return_books(
            borrow_id,
            staff,
            &ReturnRequest {
                conditions: Some(vec![CopyConditionEntry {
                    barcode: lost_barcode,
                    condition: CopyCondition::Lost,
                }]),
                condition: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(details.record.status, BorrowStatus::Lost);
    let fine = details.fine.expect("fine expected");
    assert_eq!(fine.reason, FineReason::Lost);
    // 15,000 overdue + 100,000 lost replacement
    assert_eq!(fine.amount, 115_000);

    let (total, available, borrowed, damaged, lost) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed, damaged, lost), (2, 1, 0, 0, 1));
    assert_inventory_consistent(&pool, book.id).await;
}

#[sqlx::test(migrations = "./migrations")]
async fn uniform_condition_applies_to_all_copies(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 10_000, 2).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 2).await;
    let details = services
        .borrows
        .return_books(
            borrow_id,
            staff,
            &ReturnRequest {
                conditions: None,
                condition: Some(CopyCondition::Damaged),
                notes: None,
            },
        )
        .await
        .unwrap();

    let fine = details.fine.expect("fine expected");
    // two damaged copies at 10,000 * 0.3 each
    assert_eq!(fine.amount, 6_000);

    let (_, available, borrowed, damaged, _) = inventory_counters(&pool, book.id).await;
    assert_eq!((available, borrowed, damaged), (0, 0, 2));
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn extend_advances_record_and_copy_due_dates(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 1).await;
    let before = services.borrows.get_details(borrow_id).await.unwrap().record.due_date;

    let record = services.borrows.extend(borrow_id, staff, Some(7)).await.unwrap();
    assert_eq!(record.due_date, before + chrono::Duration::days(7));
    assert!(record.extended_at.is_some());

    let copy_due: Option<chrono::DateTime<chrono::Utc>> = sqlx::query_scalar(
        "SELECT due_date FROM book_copies WHERE book_id = $1 AND current_borrower = $2 LIMIT 1",
    )
    .bind(book.id)
    .bind(user)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(copy_due, Some(record.due_date));
}

#[sqlx::test(migrations = "./migrations")]
async fn extend_blocked_by_unpaid_fine_on_unrelated_record(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book_a = seed_book(&services, "9780306406157", 100_000, 1).await;
    let book_b = seed_book(&services, "9780140449136", 100_000, 1).await;

    // A late damaged return on book A leaves an unpaid fine
    let late_borrow = borrow_flow(&services, user, staff, book_a.id, 1).await;
    backdate_due_date(&pool, late_borrow, 2).await;
    services
        .borrows
        .return_books(
            late_borrow,
            staff,
            &ReturnRequest {
                conditions: None,
                condition: Some(CopyCondition::Damaged),
                notes: None,
            },
        )
        .await
        .unwrap();

    let current = borrow_flow(&services, user, staff, book_b.id, 1).await;
    let err = services.borrows.extend(current, staff, None).await.unwrap_err();
    assert!(matches!(err, AppError::ConflictFinancial(_)));

    // Paying the fine unblocks the extension
    let fine_id: i32 = sqlx::query_scalar("SELECT id FROM fines WHERE user_id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
    services.fines.mark_paid(fine_id, staff, None).await.unwrap();
    services.borrows.extend(current, staff, None).await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn extend_requires_borrowed_status(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let details = services
        .borrows
        .create_request(user, &borrow_request(book.id, 1))
        .await
        .unwrap();

    let err = services
        .borrows
        .extend(details.record.id, staff, Some(7))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_requests_for_last_copy_allocate_once(pool: PgPool) {
    let services = build_services(pool.clone());
    let user_a = seed_user(&pool, "SV001", "user").await;
    let user_b = seed_user(&pool, "SV002", "user").await;
    let book = seed_book(&services, "9780306406157", 50_000, 1).await;

    let services_a = services.clone();
    let services_b = services.clone();
    let book_id = book.id;

    let task_a = tokio::spawn(async move {
        services_a
            .borrows
            .create_request(user_a, &borrow_request(book_id, 1))
            .await
    });
    let task_b = tokio::spawn(async move {
        services_b
            .borrows
            .create_request(user_b, &borrow_request(book_id, 1))
            .await
    });

    let result_a = task_a.await.unwrap();
    let result_b = task_b.await.unwrap();

    let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one request may win the last copy");

    let failure = if result_a.is_err() { result_a } else { result_b };
    assert!(matches!(
        failure.unwrap_err(),
        AppError::InsufficientInventory(_)
    ));

    let (total, available, borrowed, _, _) = inventory_counters(&pool, book.id).await;
    assert_eq!((total, available, borrowed), (1, 0, 1));
    assert_inventory_consistent(&pool, book.id).await;
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn statistics_are_idempotent_without_writes(pool: PgPool) {
    let services = build_services(pool.clone());
    let user = seed_user(&pool, "SV001", "user").await;
    let staff = seed_user(&pool, "ST001", "staff").await;
    let book = seed_book(&services, "9780306406157", 100_000, 2).await;

    let borrow_id = borrow_flow(&services, user, staff, book.id, 1).await;
    backdate_due_date(&pool, borrow_id, 2).await;

    let first = services.stats.borrow_statistics(None, None).await.unwrap();
    let second = services.stats.borrow_statistics(None, None).await.unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );

    // The borrowed record shows up as overdue with its lateness
    assert_eq!(first.overdue.len(), 1);
    assert_eq!(first.overdue[0].days_late, 2);
}
