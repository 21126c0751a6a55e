//! Borrow lifecycle tests: issuing, returning and renewing against the
//! in-memory store.

mod support;

use chrono::{Duration, Utc};
use std::sync::Arc;

use circulation_core::domain::{BorrowStatus, NotificationKind};
use circulation_core::service::{CirculationService, LendingError};
use support::{member, staff, MemStore};

fn service(store: &Arc<MemStore>) -> CirculationService {
    CirculationService::new(store.clone())
}

#[tokio::test]
async fn issue_decrements_stock_and_sets_due_date() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let plan = store.add_plan(3, 5.0);
    let member_id = store.add_member(Some(plan));
    let book_id = store.add_book("The Trial", 1, 1);

    let record = svc
        .issue_book(&staff(), book_id, member_id, 14)
        .await
        .unwrap();

    assert_eq!(record.status, BorrowStatus::Issued);
    assert_eq!(record.renewal_count, 0);
    assert_eq!((record.due_date - record.issue_date).num_days(), 14);

    let book = store.book_snapshot(book_id);
    assert_eq!(book.available_copies, 0);
    assert!(book.available_copies >= 0 && book.available_copies <= book.total_copies);
}

#[tokio::test]
async fn issue_fails_when_out_of_stock() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Rare Volume", 1, 0);

    let err = svc
        .issue_book(&staff(), book_id, member_id, 14)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::OutOfStock));
}

#[tokio::test]
async fn issuing_the_last_copy_twice_fails_the_second_time() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let first = store.add_member(None);
    let second = store.add_member(None);
    let book_id = store.add_book("Single Copy", 1, 1);

    svc.issue_book(&staff(), book_id, first, 14).await.unwrap();
    let err = svc
        .issue_book(&staff(), book_id, second, 14)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::OutOfStock));
    assert_eq!(store.book_snapshot(book_id).available_copies, 0);
}

#[tokio::test]
async fn issue_enforces_the_plan_borrow_limit() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let plan = store.add_plan(1, 5.0);
    let member_id = store.add_member(Some(plan));
    let first_book = store.add_book("First", 2, 2);
    let second_book = store.add_book("Second", 2, 2);

    svc.issue_book(&staff(), first_book, member_id, 14)
        .await
        .unwrap();
    let err = svc
        .issue_book(&staff(), second_book, member_id, 14)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::BorrowLimitReached { max: 1 }));
}

#[tokio::test]
async fn issue_requires_a_staff_principal() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Restricted", 1, 1);

    let err = svc
        .issue_book(&member(member_id), book_id, member_id, 14)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Forbidden(_)));
}

#[tokio::test]
async fn issue_rejects_nonpositive_lending_days() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Any", 1, 1);

    let err = svc
        .issue_book(&staff(), book_id, member_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::InvalidInput(_)));
}

#[tokio::test]
async fn on_time_return_has_no_fine() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let plan = store.add_plan(3, 5.0);
    let member_id = store.add_member(Some(plan));
    let book_id = store.add_book("Punctual", 2, 1);
    let record_id = store.seed_borrow(book_id, member_id, Utc::now() + Duration::days(5), 0, 2);

    let record = svc.return_book(&staff(), record_id).await.unwrap();

    assert_eq!(record.status, BorrowStatus::Returned);
    assert!(record.return_date.is_some());
    assert_eq!(record.fine_amount, 0.0);
    assert_eq!(store.book_snapshot(book_id).available_copies, 2);
}

#[tokio::test]
async fn late_return_charges_the_plan_rate_per_whole_day() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let plan = store.add_plan(3, 5.0);
    let member_id = store.add_member(Some(plan));
    let book_id = store.add_book("Tardy", 1, 0);
    // Issued for 14 days, returned on day 16: two whole days late.
    let due = Utc::now() - Duration::days(2) - Duration::hours(1);
    let record_id = store.seed_borrow(book_id, member_id, due, 0, 2);

    let record = svc.return_book(&staff(), record_id).await.unwrap();

    assert_eq!(record.fine_amount, 10.0);
    assert_eq!(record.status, BorrowStatus::Returned);
    let book = store.book_snapshot(book_id);
    assert_eq!(book.available_copies, 1);
    assert!(book.available_copies <= book.total_copies);
}

#[tokio::test]
async fn returning_twice_fails_the_second_time() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Once", 1, 0);
    let record_id = store.seed_borrow(book_id, member_id, Utc::now() + Duration::days(5), 0, 2);

    svc.return_book(&staff(), record_id).await.unwrap();
    let err = svc.return_book(&staff(), record_id).await.unwrap_err();
    assert!(matches!(err, LendingError::NotFound(_)));
    // No double increment either.
    assert_eq!(store.book_snapshot(book_id).available_copies, 1);
}

#[tokio::test]
async fn renew_advances_the_due_date_and_notifies() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Renewable", 1, 0);
    let due = Utc::now() + Duration::days(3);
    let record_id = store.seed_borrow(book_id, member_id, due, 0, 2);

    let record = svc
        .renew_book(&member(member_id), record_id)
        .await
        .unwrap();

    assert_eq!(record.due_date, due + Duration::days(14));
    assert_eq!(record.renewal_count, 1);
    assert_eq!(record.renewals_remaining(), 1);

    let notices = store.notifications_of_kind(NotificationKind::RenewalApproved);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].user_id, member_id);
    assert_eq!(notices[0].related_id, Some(record_id));
}

#[tokio::test]
async fn renew_fails_once_the_limit_is_spent_regardless_of_due_date() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Exhausted", 1, 0);
    let record_id = store.seed_borrow(book_id, member_id, Utc::now() + Duration::days(10), 2, 2);

    let err = svc
        .renew_book(&member(member_id), record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::RenewalLimitReached { max: 2 }));
}

#[tokio::test]
async fn renew_fails_for_overdue_records_even_with_renewals_left() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let member_id = store.add_member(None);
    let book_id = store.add_book("Late", 1, 0);
    let record_id = store.seed_borrow(book_id, member_id, Utc::now() - Duration::hours(1), 0, 2);

    let err = svc
        .renew_book(&member(member_id), record_id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::AlreadyOverdue));
}

#[tokio::test]
async fn renew_hides_records_of_other_members() {
    let store = Arc::new(MemStore::new());
    let svc = service(&store);
    let owner = store.add_member(None);
    let other = store.add_member(None);
    let book_id = store.add_book("Private", 1, 0);
    let record_id = store.seed_borrow(book_id, owner, Utc::now() + Duration::days(3), 0, 2);

    let err = svc.renew_book(&member(other), record_id).await.unwrap_err();
    assert!(matches!(err, LendingError::NotFound(_)));
}
