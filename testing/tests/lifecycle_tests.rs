//! Borrow lifecycle tests against the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration;
use libris_core::{
    BookRef, BorrowLifecycle, Clock, ConflictReason, Entity, LibraryError, LibraryStore, Loan,
    LoanId, RequestBorrow, RequestStatus,
};
use libris_testing::{LibraryFixture, ManualClock, SeededStudent};
use std::sync::Arc;

fn setup() -> (LibraryFixture, Arc<ManualClock>, BorrowLifecycle) {
    let fixture = LibraryFixture::new();
    let clock = Arc::new(ManualClock::default());
    let lifecycle = BorrowLifecycle::new(fixture.store_arc(), clock.clone());
    (fixture, clock, lifecycle)
}

fn borrow(student: &SeededStudent, title: &str) -> RequestBorrow {
    RequestBorrow {
        user_code: student.user.user_code.clone(),
        book: BookRef::Title(title.to_string()),
        email: student.profile.email.clone(),
    }
}

#[tokio::test]
async fn request_takes_one_copy_and_stays_pending() {
    let (fixture, _clock, lifecycle) = setup();
    let book = fixture.book("Operating Systems", 2);
    let ada = fixture.student("S100", "ada@college.edu");

    let request = lifecycle
        .request_borrow(borrow(&ada, "Operating Systems"))
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.profile_id, ada.profile.id);
    assert_eq!(fixture.store().book(book.id).unwrap().available_copies, 1);
}

#[tokio::test]
async fn last_copy_goes_to_exactly_one_of_two_concurrent_requests() {
    let (fixture, _clock, lifecycle) = setup();
    let book = fixture.book("Distributed Systems", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let alan = fixture.student("S200", "alan@college.edu");

    let first = lifecycle.clone();
    let second = lifecycle.clone();
    let a = tokio::spawn(async move {
        first
            .request_borrow(borrow(&ada, "Distributed Systems"))
            .await
    });
    let b = tokio::spawn(async move {
        second
            .request_borrow(borrow(&alan, "Distributed Systems"))
            .await
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .any(|r| *r == Err(LibraryError::Conflict(ConflictReason::OutOfStock))));
    assert_eq!(fixture.store().book(book.id).unwrap().available_copies, 0);
}

#[tokio::test]
async fn overdue_loan_accrues_penalty_from_elapsed_minutes() {
    let (fixture, clock, lifecycle) = setup();
    let book = fixture.book("Compilers", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let now = clock.now();
    let loan = Loan {
        id: LoanId::new(),
        book_id: book.id,
        profile_id: ada.profile.id,
        request_id: None,
        borrowed_at: now - Duration::minutes(152),
        due_date: now - Duration::minutes(47),
        returned: false,
        returned_at: None,
    };
    fixture.store().insert_loan(loan.clone());

    let report = lifecycle.accrue_penalties().await.unwrap();

    assert_eq!((report.examined, report.updated, report.failed), (1, 1, 0));
    let penalties = fixture.store().penalties();
    assert_eq!(penalties.len(), 1);
    assert_eq!(penalties[0].days_overdue, 3);
    assert_eq!(penalties[0].amount, 30);
    assert_eq!(penalties[0].loan_id, loan.id);

    let cached = fixture.store().user(ada.user.id).unwrap().penalties;
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].amount, 30);
}

#[tokio::test]
async fn third_outstanding_request_is_refused_without_touching_stock() {
    let (fixture, _clock, lifecycle) = setup();
    fixture.book("Algorithms", 1);
    fixture.book("Networks", 1);
    let databases = fixture.book("Databases", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    lifecycle.request_borrow(borrow(&ada, "Algorithms")).await.unwrap();
    lifecycle.request_borrow(borrow(&ada, "Networks")).await.unwrap();
    let third = lifecycle.request_borrow(borrow(&ada, "Databases")).await;

    assert_eq!(
        third,
        Err(LibraryError::Conflict(ConflictReason::BorrowLimitExceeded))
    );
    assert_eq!(fixture.store().book(databases.id).unwrap().available_copies, 1);
    assert_eq!(fixture.store().requests().len(), 2);
}

#[tokio::test]
async fn unknown_title_has_no_side_effects() {
    let (fixture, _clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    let result = lifecycle.request_borrow(borrow(&ada, "Missing Manual")).await;

    assert_eq!(result, Err(LibraryError::NotFound(Entity::Book)));
    assert_eq!(fixture.store().book(book.id).unwrap().available_copies, 1);
    assert!(fixture.store().requests().is_empty());
}

#[tokio::test]
async fn lookups_fail_in_user_book_profile_order() {
    let (fixture, _clock, lifecycle) = setup();
    fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    let unknown_user = RequestBorrow {
        user_code: "nobody".to_string(),
        book: BookRef::Title("Missing".to_string()),
        email: "nobody@college.edu".to_string(),
    };
    assert_eq!(
        lifecycle.request_borrow(unknown_user).await,
        Err(LibraryError::NotFound(Entity::User))
    );

    let unknown_profile = RequestBorrow {
        email: "other@college.edu".to_string(),
        ..borrow(&ada, "Algorithms")
    };
    assert_eq!(
        lifecycle.request_borrow(unknown_profile).await,
        Err(LibraryError::NotFound(Entity::Profile))
    );
}

#[tokio::test]
async fn blank_fields_are_rejected_before_any_lookup() {
    let (fixture, _clock, lifecycle) = setup();
    let ada = fixture.student("S100", "ada@college.edu");

    let result = lifecycle
        .request_borrow(RequestBorrow {
            email: "  ".to_string(),
            ..borrow(&ada, "Algorithms")
        })
        .await;

    assert!(matches!(result, Err(LibraryError::Validation(_))));
}

#[tokio::test]
async fn duplicate_request_is_checked_before_stock() {
    let (fixture, _clock, lifecycle) = setup();
    fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    lifecycle.request_borrow(borrow(&ada, "Algorithms")).await.unwrap();
    let again = lifecycle.request_borrow(borrow(&ada, "Algorithms")).await;

    assert_eq!(
        again,
        Err(LibraryError::Conflict(ConflictReason::DuplicateRequest))
    );
}

#[tokio::test]
async fn approve_opens_loan_due_after_loan_period() {
    let (fixture, clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    let request = lifecycle.request_borrow(borrow(&ada, "Algorithms")).await.unwrap();
    let loan = lifecycle.approve_request(request.id).await.unwrap();

    assert_eq!(loan.book_id, book.id);
    assert_eq!(loan.request_id, Some(request.id));
    assert_eq!(loan.due_date, clock.now() + Duration::minutes(105));
    assert_eq!(fixture.store().book(book.id).unwrap().available_copies, 0);

    assert_eq!(
        lifecycle.approve_request(request.id).await,
        Err(LibraryError::Conflict(ConflictReason::AlreadyDecided))
    );
    assert_eq!(
        lifecycle.request_borrow(borrow(&ada, "Algorithms")).await,
        Err(LibraryError::Conflict(ConflictReason::AlreadyBorrowed))
    );
}

#[tokio::test]
async fn reject_restores_the_copy() {
    let (fixture, _clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    let request = lifecycle.request_borrow(borrow(&ada, "Algorithms")).await.unwrap();
    let rejected = lifecycle.reject_request(request.id).await.unwrap();

    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(fixture.store().book(book.id).unwrap().available_copies, 1);
    assert_eq!(
        lifecycle.reject_request(request.id).await,
        Err(LibraryError::Conflict(ConflictReason::AlreadyDecided))
    );
}

#[tokio::test]
async fn late_return_freezes_penalty_and_records_history() {
    let (fixture, clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");

    let request = lifecycle.request_borrow(borrow(&ada, "Algorithms")).await.unwrap();
    let loan = lifecycle.approve_request(request.id).await.unwrap();

    clock.advance(Duration::minutes(105 + 31));
    lifecycle.accrue_penalties().await.unwrap();
    let receipt = lifecycle.return_loan(loan.id).await.unwrap();

    assert!(receipt.loan.returned);
    assert_eq!(receipt.available_copies, 1);
    let frozen = receipt.penalty.expect("overdue loan carries a penalty");
    assert!(frozen.frozen);
    assert_eq!(frozen.amount, 20);

    clock.advance(Duration::hours(3));
    let report = lifecycle.accrue_penalties().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(fixture.store().penalties()[0].amount, 20);

    let history = fixture
        .store()
        .user_history(ada.user.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].book.id, book.id);
    assert_eq!(history[0].penalty_amount, 20);

    assert_eq!(
        lifecycle.return_loan(loan.id).await,
        Err(LibraryError::Conflict(ConflictReason::AlreadyReturned))
    );
}

#[tokio::test]
async fn accrual_is_idempotent_at_the_same_instant() {
    let (fixture, clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let now = clock.now();
    fixture.store().insert_loan(Loan {
        id: LoanId::new(),
        book_id: book.id,
        profile_id: ada.profile.id,
        request_id: None,
        borrowed_at: now - Duration::hours(4),
        due_date: now - Duration::minutes(61),
        returned: false,
        returned_at: None,
    });

    lifecycle.accrue_penalties().await.unwrap();
    let first = fixture.store().penalties();
    lifecycle.accrue_penalties().await.unwrap();
    let second = fixture.store().penalties();

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].amount, second[0].amount);
    assert_eq!(second[0].days_overdue, 4);
    assert_eq!(fixture.store().user(ada.user.id).unwrap().penalties.len(), 1);
}

#[tokio::test]
async fn one_failing_loan_does_not_stop_the_pass() {
    let (fixture, clock, lifecycle) = setup();
    let algorithms = fixture.book("Algorithms", 1);
    let networks = fixture.book("Networks", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let now = clock.now();

    let broken = LoanId::new();
    for (id, book_id) in [(broken, algorithms.id), (LoanId::new(), networks.id)] {
        fixture.store().insert_loan(Loan {
            id,
            book_id,
            profile_id: ada.profile.id,
            request_id: None,
            borrowed_at: now - Duration::hours(3),
            due_date: now - Duration::minutes(30),
            returned: false,
            returned_at: None,
        });
    }
    fixture.store().fail_penalty_upserts_for(broken);

    let report = lifecycle.accrue_penalties().await.unwrap();

    assert_eq!((report.examined, report.updated, report.failed), (2, 1, 1));
    let penalties = fixture.store().penalties();
    assert_eq!(penalties.len(), 1);
    assert_eq!(penalties[0].book_id, networks.id);
}

#[tokio::test]
async fn due_within_lists_loans_inside_the_window() {
    let (fixture, clock, lifecycle) = setup();
    let soon = fixture.book("Algorithms", 1);
    let later = fixture.book("Networks", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let now = clock.now();

    for (book_id, due_in) in [(soon.id, 4), (later.id, 30)] {
        fixture.store().insert_loan(Loan {
            id: LoanId::new(),
            book_id,
            profile_id: ada.profile.id,
            request_id: None,
            borrowed_at: now - Duration::minutes(60),
            due_date: now + Duration::minutes(due_in),
            returned: false,
            returned_at: None,
        });
    }

    let due = lifecycle.due_within(Duration::minutes(5)).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].book.title, "Algorithms");
    assert_eq!(due[0].borrower.email, "ada@college.edu");

    let wider = lifecycle.due_within(Duration::minutes(10)).await.unwrap();
    assert_eq!(wider.len(), 1);
}

#[tokio::test]
async fn due_within_skips_returned_loans() {
    let (fixture, clock, lifecycle) = setup();
    let book = fixture.book("Algorithms", 1);
    let ada = fixture.student("S100", "ada@college.edu");
    let now = clock.now();
    fixture.store().insert_loan(Loan {
        id: LoanId::new(),
        book_id: book.id,
        profile_id: ada.profile.id,
        request_id: None,
        borrowed_at: now - Duration::minutes(60),
        due_date: now + Duration::minutes(3),
        returned: true,
        returned_at: Some(now - Duration::minutes(1)),
    });

    let due = lifecycle.due_within(Duration::minutes(5)).await.unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn due_within_rejects_an_unrepresentable_horizon() {
    let (_fixture, _clock, lifecycle) = setup();

    let err = lifecycle
        .due_within(Duration::try_minutes(1_000_000_000_000).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LibraryError::Validation(_)));
}
