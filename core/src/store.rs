//! The persistence seam of the lifecycle.
//!
//! `LibraryStore` is object-safe (boxed futures) so the server can hold an
//! `Arc<dyn LibraryStore>` and tests can swap in the in-memory store.
//!
//! # Atomicity contract
//!
//! Every lifecycle method below is one atomic unit. In particular
//! [`create_borrow_request`](LibraryStore::create_borrow_request) must read the
//! [`BorrowSnapshot`](crate::rules::BorrowSnapshot), evaluate
//! [`check_eligibility`](crate::rules::check_eligibility) and apply the stock
//! decrement without any other writer interleaving: two concurrent attempts on
//! the last copy cannot both succeed.
//!
//! # Implementations
//!
//! - `PostgresLibraryStore` (in `libris-postgres`): transactions and row locks
//! - `InMemoryLibraryStore` (in `libris-testing`): one mutex over all state

use crate::error::Result;
use crate::rules::{BorrowPolicy, PenaltyAssessment};
use crate::types::{
    Book, BookDetails, BookId, BookRef, BookUpdate, BookWithAuthors, BorrowRequest, HistoryEntry,
    Loan, LoanId, LoanView, Member, Penalty, PenaltyView, Profile, RequestBorrow, RequestId,
    RequestView, ReturnReceipt, Session, SessionToken, UserAccount, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence operations used by the lifecycle manager and the read side.
pub trait LibraryStore: Send + Sync {
    // ═══════════════════════════════════════════════════════════
    // Identity & catalog lookups
    // ═══════════════════════════════════════════════════════════

    /// Find an identity by login code.
    ///
    /// # Errors
    ///
    /// `NotFound(User)` if no identity has this code.
    fn resolve_user<'a>(&'a self, user_code: &'a str) -> StoreFuture<'a, UserAccount>;

    /// Find an identity by id.
    ///
    /// # Errors
    ///
    /// `NotFound(User)` if the id is unknown.
    fn resolve_user_by_id(&self, user_id: UserId) -> StoreFuture<'_, UserAccount>;

    /// Find a catalog entry by id or exact title.
    ///
    /// # Errors
    ///
    /// `NotFound(Book)` if nothing matches.
    fn resolve_book<'a>(&'a self, book: &'a BookRef) -> StoreFuture<'a, Book>;

    /// Find a profile by email.
    ///
    /// # Errors
    ///
    /// `NotFound(Profile)` if no profile has this email.
    fn resolve_profile<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Profile>;

    /// Validate a bearer token.
    ///
    /// # Errors
    ///
    /// `NotFound(Session)` if the token is unknown or expired at `now`.
    fn resolve_session(&self, token: SessionToken, now: DateTime<Utc>)
    -> StoreFuture<'_, Session>;

    // ═══════════════════════════════════════════════════════════
    // Lifecycle (each call is atomic)
    // ═══════════════════════════════════════════════════════════

    /// Create a pending request and take one copy off the shelf.
    ///
    /// Resolves user, book and profile in that order, then evaluates
    /// `check_eligibility` and mutates inside one atomic section.
    ///
    /// # Errors
    ///
    /// `NotFound(User | Book | Profile)`, `Conflict(..)` from the eligibility
    /// rules, or `Storage` on infrastructure failure. No side effects on error.
    fn create_borrow_request<'a>(
        &'a self,
        request: &'a RequestBorrow,
        policy: &'a BorrowPolicy,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, BorrowRequest>;

    /// Approve a pending request and open a loan due at `due_date`.
    ///
    /// # Errors
    ///
    /// `NotFound(Request)` or `Conflict(AlreadyDecided)`.
    fn approve_request(
        &self,
        request_id: RequestId,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Loan>;

    /// Reject a pending request and put its copy back on the shelf.
    ///
    /// # Errors
    ///
    /// `NotFound(Request)` or `Conflict(AlreadyDecided)`.
    fn reject_request(&self, request_id: RequestId, now: DateTime<Utc>)
    -> StoreFuture<'_, BorrowRequest>;

    /// Mark a loan returned, restock the book, write history and freeze any penalty.
    ///
    /// # Errors
    ///
    /// `NotFound(Loan)` or `Conflict(AlreadyReturned)`.
    fn return_loan(&self, loan_id: LoanId, now: DateTime<Utc>) -> StoreFuture<'_, ReturnReceipt>;

    /// Unreturned loans with `due_date < now`.
    ///
    /// # Errors
    ///
    /// `Storage` on infrastructure failure.
    fn overdue_loans(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Loan>>;

    /// Insert or overwrite the penalty of the loan's (profile, book) pair and
    /// refresh the penalty cache on the owning identity.
    ///
    /// A frozen penalty of the same loan is left untouched and returned as is.
    ///
    /// # Errors
    ///
    /// `NotFound(Loan)` if the loan vanished, `Conflict(AlreadyReturned)` if it
    /// was returned after being listed, `Storage` on failure.
    fn upsert_penalty<'a>(
        &'a self,
        loan: &'a Loan,
        assessment: PenaltyAssessment,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Penalty>;

    // ═══════════════════════════════════════════════════════════
    // Catalog (read side and admin edits)
    // ═══════════════════════════════════════════════════════════

    /// Fetch a book by id.
    ///
    /// # Errors
    ///
    /// `NotFound(Book)`.
    fn get_book(&self, book_id: BookId) -> StoreFuture<'_, Book>;

    /// All catalog entries, ordered by title.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn list_books(&self) -> StoreFuture<'_, Vec<Book>>;

    /// A book and up to `limit` other entries.
    ///
    /// # Errors
    ///
    /// `NotFound(Book)`.
    fn book_details(&self, book_id: BookId, limit: i64) -> StoreFuture<'_, BookDetails>;

    /// Case-insensitive substring match on title or author name.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn search_books<'a>(&'a self, query: &'a str) -> StoreFuture<'a, Vec<BookWithAuthors>>;

    /// Filter by exact subject name and/or author-or-title text.
    ///
    /// When `query` names an author, books by that author (first or second
    /// position) match; otherwise `query` is matched against titles.
    ///
    /// # Errors
    ///
    /// `NotFound(Subject)` for an unknown subject name.
    fn filter_books<'a>(
        &'a self,
        subject: Option<&'a str>,
        query: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<BookWithAuthors>>;

    /// Distinct non-empty streams.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn list_streams(&self) -> StoreFuture<'_, Vec<String>>;

    /// Up to `limit` titles containing `fragment`, case-insensitive.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn autocomplete_titles<'a>(
        &'a self,
        fragment: &'a str,
        limit: i64,
    ) -> StoreFuture<'a, Vec<String>>;

    /// Edit catalog fields; stock counters are not editable here.
    ///
    /// # Errors
    ///
    /// `NotFound(Book)`.
    fn update_book<'a>(&'a self, book_id: BookId, update: &'a BookUpdate)
    -> StoreFuture<'a, Book>;

    // ═══════════════════════════════════════════════════════════
    // Display queries
    // ═══════════════════════════════════════════════════════════

    /// Identities left-joined with their profiles.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn list_members(&self) -> StoreFuture<'_, Vec<Member>>;

    /// Every loan with book and borrower summaries, newest first.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn list_loans(&self) -> StoreFuture<'_, Vec<LoanView>>;

    /// Unreturned loans of one identity.
    ///
    /// # Errors
    ///
    /// `NotFound(User)` for an unknown id.
    fn user_loans(&self, user_id: UserId) -> StoreFuture<'_, Vec<LoanView>>;

    /// Book history of one identity, most recent return first.
    ///
    /// # Errors
    ///
    /// `NotFound(User)` for an unknown id.
    fn user_history(&self, user_id: UserId) -> StoreFuture<'_, Vec<HistoryEntry>>;

    /// Every penalty with book and borrower summaries.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn list_penalties(&self) -> StoreFuture<'_, Vec<PenaltyView>>;

    /// Loans with `from <= due_date <= to`, earliest first.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn loans_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<LoanView>>;

    /// Requests awaiting a decision, oldest first.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn pending_requests(&self) -> StoreFuture<'_, Vec<RequestView>>;

    /// Connectivity check used by the readiness probe.
    ///
    /// # Errors
    ///
    /// `Storage` if the backend is unreachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
