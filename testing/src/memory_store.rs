//! In-memory `LibraryStore`.
//!
//! All state sits behind a single mutex. Every trait method takes the lock
//! once, evaluates and mutates, then releases it, so each lifecycle operation
//! is atomic exactly as the `PostgreSQL` store's transactions are.

use chrono::{DateTime, Utc};
use libris_core::error::{ConflictReason, Entity, LibraryError, Result};
use libris_core::rules::{BorrowPolicy, BorrowSnapshot, PenaltyAssessment, check_eligibility};
use libris_core::store::{LibraryStore, StoreFuture};
use libris_core::types::{
    Author, Book, BookDetails, BookId, BookRef, BookSummary, BookUpdate, BookWithAuthors,
    BorrowRequest, HistoryEntry, Loan, LoanId, LoanView, Member, Penalty, PenaltyId, PenaltyView,
    Profile, ProfileId, ProfileSummary, RequestBorrow, RequestId, RequestStatus, RequestView,
    ReturnReceipt, Session, SessionToken, Subject, UserAccount, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct HistoryRecord {
    profile_id: ProfileId,
    book_id: BookId,
    borrowed_at: DateTime<Utc>,
    returned_at: DateTime<Utc>,
    penalty_amount: i64,
}

#[derive(Debug, Default)]
struct LibraryState {
    books: HashMap<BookId, Book>,
    authors: HashMap<i32, Author>,
    subjects: HashMap<i32, Subject>,
    users: HashMap<UserId, UserAccount>,
    profiles: HashMap<ProfileId, Profile>,
    sessions: HashMap<SessionToken, Session>,
    requests: HashMap<RequestId, BorrowRequest>,
    loans: HashMap<LoanId, Loan>,
    penalties: HashMap<(ProfileId, BookId), Penalty>,
    history: Vec<HistoryRecord>,
    failing_loans: HashSet<LoanId>,
}

impl LibraryState {
    fn find_book(&self, book: &BookRef) -> Result<&Book> {
        match book {
            BookRef::Id(id) => self.books.get(id),
            BookRef::Title(title) => self.books.values().find(|b| &b.title == title),
        }
        .ok_or(LibraryError::NotFound(Entity::Book))
    }

    fn snapshot(&self, book_id: BookId, profile_id: ProfileId) -> BorrowSnapshot {
        let pending = self
            .requests
            .values()
            .filter(|r| r.profile_id == profile_id && r.status == RequestStatus::Pending);
        let active = self
            .loans
            .values()
            .filter(|l| l.profile_id == profile_id && !l.returned);

        BorrowSnapshot {
            pending_request_exists: pending.clone().any(|r| r.book_id == book_id),
            active_loan_exists: active.clone().any(|l| l.book_id == book_id),
            available_copies: self.books.get(&book_id).map_or(0, |b| b.available_copies),
            outstanding: i64::try_from(pending.count() + active.count()).unwrap_or(i64::MAX),
        }
    }

    fn restock(&mut self, book_id: BookId) -> i32 {
        self.books.get_mut(&book_id).map_or(0, |book| {
            if book.available_copies < book.total_copies {
                book.available_copies += 1;
            }
            book.available_copies
        })
    }

    fn book_summary(&self, book_id: BookId) -> BookSummary {
        self.books.get(&book_id).map_or_else(
            || BookSummary {
                id: book_id,
                title: String::new(),
                authors: Vec::new(),
                image_url: None,
            },
            |book| BookSummary {
                id: book.id,
                title: book.title.clone(),
                authors: self.author_names(book),
                image_url: book.image_url.clone(),
            },
        )
    }

    fn profile_summary(&self, profile_id: ProfileId) -> ProfileSummary {
        self.profiles.get(&profile_id).map_or_else(
            || ProfileSummary {
                id: profile_id,
                student_id: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                email: String::new(),
            },
            Profile::summary,
        )
    }

    fn author_names(&self, book: &Book) -> Vec<String> {
        book.author_ids
            .iter()
            .filter_map(|id| self.authors.get(id).map(|a| a.name.clone()))
            .collect()
    }

    fn with_authors(&self, book: &Book) -> BookWithAuthors {
        BookWithAuthors {
            book: book.clone(),
            author_names: self.author_names(book),
        }
    }

    fn loan_view(&self, loan: &Loan) -> LoanView {
        LoanView {
            loan: loan.clone(),
            book: self.book_summary(loan.book_id),
            borrower: self.profile_summary(loan.profile_id),
        }
    }

    fn sorted_books(&self) -> Vec<&Book> {
        let mut books: Vec<&Book> = self.books.values().collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        books
    }

    fn profile_of(&self, user_id: UserId) -> Result<Option<ProfileId>> {
        self.users
            .get(&user_id)
            .map(|u| u.profile_id)
            .ok_or(LibraryError::NotFound(Entity::User))
    }

    fn refresh_penalty_cache(&mut self, profile_id: ProfileId) {
        let mut summaries: Vec<_> = self
            .penalties
            .values()
            .filter(|p| p.profile_id == profile_id)
            .map(Penalty::summary)
            .collect();
        summaries.sort_by_key(|s| s.created_at);
        for user in self.users.values_mut() {
            if user.profile_id == Some(profile_id) {
                user.penalties.clone_from(&summaries);
            }
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn ready<'a, T: Send + 'a>(result: Result<T>) -> StoreFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

/// In-memory library store for fast, deterministic tests.
///
/// Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLibraryStore {
    state: Arc<Mutex<LibraryState>>,
}

impl InMemoryLibraryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LibraryState>> {
        self.state
            .lock()
            .map_err(|_| LibraryError::storage("in-memory store lock poisoned"))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LibraryState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        f(&mut guard)
    }

    // ═══════════════════════════════════════════════════════════
    // Seeding
    //
    // Seeding panics on a poisoned lock: a half-seeded store would make the
    // calling test assert against the wrong state.
    // ═══════════════════════════════════════════════════════════

    #[allow(clippy::expect_used)]
    fn seed(&self, f: impl FnOnce(&mut LibraryState)) {
        let mut guard = self.lock().expect("in-memory library state poisoned");
        f(&mut guard);
    }

    /// Insert or replace a book.
    pub fn insert_book(&self, book: Book) {
        self.seed(|s| {
            s.books.insert(book.id, book);
        });
    }

    /// Insert or replace an author.
    pub fn insert_author(&self, author: Author) {
        self.seed(|s| {
            s.authors.insert(author.id, author);
        });
    }

    /// Insert or replace a subject.
    pub fn insert_subject(&self, subject: Subject) {
        self.seed(|s| {
            s.subjects.insert(subject.id, subject);
        });
    }

    /// Insert or replace an identity.
    pub fn insert_user(&self, user: UserAccount) {
        self.seed(|s| {
            s.users.insert(user.id, user);
        });
    }

    /// Insert or replace a profile.
    pub fn insert_profile(&self, profile: Profile) {
        self.seed(|s| {
            s.profiles.insert(profile.id, profile);
        });
    }

    /// Insert a session.
    pub fn insert_session(&self, session: Session) {
        self.seed(|s| {
            s.sessions.insert(session.token, session);
        });
    }

    /// Insert a loan directly, bypassing the request flow.
    pub fn insert_loan(&self, loan: Loan) {
        self.seed(|s| {
            s.loans.insert(loan.id, loan);
        });
    }

    /// Make every penalty upsert for `loan_id` fail with a storage error.
    pub fn fail_penalty_upserts_for(&self, loan_id: LoanId) {
        self.seed(|s| {
            s.failing_loans.insert(loan_id);
        });
    }

    // ═══════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════

    /// Current state of a book.
    #[must_use]
    pub fn book(&self, book_id: BookId) -> Option<Book> {
        self.lock().ok()?.books.get(&book_id).cloned()
    }

    /// Current state of an identity.
    #[must_use]
    pub fn user(&self, user_id: UserId) -> Option<UserAccount> {
        self.lock().ok()?.users.get(&user_id).cloned()
    }

    /// All borrow requests.
    #[must_use]
    pub fn requests(&self) -> Vec<BorrowRequest> {
        self.lock()
            .map(|s| s.requests.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All loans.
    #[must_use]
    pub fn loans(&self) -> Vec<Loan> {
        self.lock()
            .map(|s| s.loans.values().cloned().collect())
            .unwrap_or_default()
    }

    /// All penalties.
    #[must_use]
    pub fn penalties(&self) -> Vec<Penalty> {
        self.lock()
            .map(|s| s.penalties.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl LibraryStore for InMemoryLibraryStore {
    fn resolve_user<'a>(&'a self, user_code: &'a str) -> StoreFuture<'a, UserAccount> {
        ready(self.with_state(|s| {
            s.users
                .values()
                .find(|u| u.user_code == user_code)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::User))
        }))
    }

    fn resolve_user_by_id(&self, user_id: UserId) -> StoreFuture<'_, UserAccount> {
        ready(self.with_state(|s| {
            s.users
                .get(&user_id)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::User))
        }))
    }

    fn resolve_book<'a>(&'a self, book: &'a BookRef) -> StoreFuture<'a, Book> {
        ready(self.with_state(|s| s.find_book(book).cloned()))
    }

    fn resolve_profile<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Profile> {
        ready(self.with_state(|s| {
            s.profiles
                .values()
                .find(|p| p.email == email)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::Profile))
        }))
    }

    fn resolve_session(
        &self,
        token: SessionToken,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Session> {
        ready(self.with_state(|s| {
            s.sessions
                .get(&token)
                .filter(|session| session.expires_at > now)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::Session))
        }))
    }

    fn create_borrow_request<'a>(
        &'a self,
        request: &'a RequestBorrow,
        policy: &'a BorrowPolicy,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, BorrowRequest> {
        ready(self.with_state(|s| {
            if !s.users.values().any(|u| u.user_code == request.user_code) {
                return Err(LibraryError::NotFound(Entity::User));
            }
            let book_id = s.find_book(&request.book)?.id;
            let profile_id = s
                .profiles
                .values()
                .find(|p| p.email == request.email)
                .map(|p| p.id)
                .ok_or(LibraryError::NotFound(Entity::Profile))?;

            check_eligibility(&s.snapshot(book_id, profile_id), policy)?;

            let book = s
                .books
                .get_mut(&book_id)
                .ok_or(LibraryError::NotFound(Entity::Book))?;
            book.available_copies -= 1;

            let created = BorrowRequest {
                id: RequestId::new(),
                book_id,
                profile_id,
                status: RequestStatus::Pending,
                created_at: now,
                decided_at: None,
            };
            s.requests.insert(created.id, created.clone());
            Ok(created)
        }))
    }

    fn approve_request(
        &self,
        request_id: RequestId,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Loan> {
        ready(self.with_state(|s| {
            let request = s
                .requests
                .get_mut(&request_id)
                .ok_or(LibraryError::NotFound(Entity::Request))?;
            if request.status.is_terminal() {
                return Err(LibraryError::Conflict(ConflictReason::AlreadyDecided));
            }
            request.status = RequestStatus::Approved;
            request.decided_at = Some(now);

            let loan = Loan {
                id: LoanId::new(),
                book_id: request.book_id,
                profile_id: request.profile_id,
                request_id: Some(request_id),
                borrowed_at: now,
                due_date,
                returned: false,
                returned_at: None,
            };
            s.loans.insert(loan.id, loan.clone());
            Ok(loan)
        }))
    }

    fn reject_request(
        &self,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, BorrowRequest> {
        ready(self.with_state(|s| {
            let request = s
                .requests
                .get_mut(&request_id)
                .ok_or(LibraryError::NotFound(Entity::Request))?;
            if request.status.is_terminal() {
                return Err(LibraryError::Conflict(ConflictReason::AlreadyDecided));
            }
            request.status = RequestStatus::Rejected;
            request.decided_at = Some(now);
            let rejected = request.clone();
            s.restock(rejected.book_id);
            Ok(rejected)
        }))
    }

    fn return_loan(&self, loan_id: LoanId, now: DateTime<Utc>) -> StoreFuture<'_, ReturnReceipt> {
        ready(self.with_state(|s| {
            let loan = s
                .loans
                .get_mut(&loan_id)
                .ok_or(LibraryError::NotFound(Entity::Loan))?;
            if loan.returned {
                return Err(LibraryError::Conflict(ConflictReason::AlreadyReturned));
            }
            loan.returned = true;
            loan.returned_at = Some(now);
            let loan = loan.clone();

            let available_copies = s.restock(loan.book_id);

            let penalty = s
                .penalties
                .get_mut(&(loan.profile_id, loan.book_id))
                .filter(|p| p.loan_id == loan.id)
                .map(|p| {
                    p.frozen = true;
                    p.updated_at = now;
                    p.clone()
                });

            s.history.push(HistoryRecord {
                profile_id: loan.profile_id,
                book_id: loan.book_id,
                borrowed_at: loan.borrowed_at,
                returned_at: now,
                penalty_amount: penalty.as_ref().map_or(0, |p| p.amount),
            });

            Ok(ReturnReceipt {
                loan,
                available_copies,
                penalty,
            })
        }))
    }

    fn overdue_loans(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Loan>> {
        ready(self.with_state(|s| {
            let mut overdue: Vec<Loan> = s
                .loans
                .values()
                .filter(|l| !l.returned && l.due_date < now)
                .cloned()
                .collect();
            overdue.sort_by_key(|l| l.due_date);
            Ok(overdue)
        }))
    }

    fn upsert_penalty<'a>(
        &'a self,
        loan: &'a Loan,
        assessment: PenaltyAssessment,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Penalty> {
        ready(self.with_state(|s| {
            if s.failing_loans.contains(&loan.id) {
                return Err(LibraryError::storage("injected penalty failure"));
            }
            match s.loans.get(&loan.id) {
                None => return Err(LibraryError::NotFound(Entity::Loan)),
                Some(current) if current.returned => {
                    return Err(LibraryError::Conflict(ConflictReason::AlreadyReturned));
                }
                Some(_) => {}
            }

            let key = (loan.profile_id, loan.book_id);
            let penalty = match s.penalties.get_mut(&key) {
                Some(existing) if existing.frozen && existing.loan_id == loan.id => {
                    existing.clone()
                }
                Some(existing) => {
                    if existing.loan_id != loan.id {
                        existing.loan_id = loan.id;
                        existing.frozen = false;
                        existing.created_at = now;
                    }
                    existing.days_overdue = assessment.days_overdue;
                    existing.amount = assessment.amount;
                    existing.updated_at = now;
                    existing.clone()
                }
                None => {
                    let created = Penalty {
                        id: PenaltyId::new(),
                        profile_id: loan.profile_id,
                        book_id: loan.book_id,
                        loan_id: loan.id,
                        days_overdue: assessment.days_overdue,
                        amount: assessment.amount,
                        frozen: false,
                        created_at: now,
                        updated_at: now,
                    };
                    s.penalties.insert(key, created.clone());
                    created
                }
            };

            s.refresh_penalty_cache(loan.profile_id);
            Ok(penalty)
        }))
    }

    fn get_book(&self, book_id: BookId) -> StoreFuture<'_, Book> {
        ready(self.with_state(|s| {
            s.books
                .get(&book_id)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::Book))
        }))
    }

    fn list_books(&self) -> StoreFuture<'_, Vec<Book>> {
        ready(self.with_state(|s| Ok(s.sorted_books().into_iter().cloned().collect())))
    }

    fn book_details(&self, book_id: BookId, limit: i64) -> StoreFuture<'_, BookDetails> {
        ready(self.with_state(|s| {
            let book = s
                .books
                .get(&book_id)
                .cloned()
                .ok_or(LibraryError::NotFound(Entity::Book))?;
            let recommendations = s
                .sorted_books()
                .into_iter()
                .filter(|b| b.id != book_id)
                .take(usize::try_from(limit).unwrap_or(0))
                .cloned()
                .collect();
            Ok(BookDetails {
                book,
                recommendations,
            })
        }))
    }

    fn search_books<'a>(&'a self, query: &'a str) -> StoreFuture<'a, Vec<BookWithAuthors>> {
        ready(self.with_state(|s| {
            let author_ids: HashSet<i32> = s
                .authors
                .values()
                .filter(|a| contains_ci(&a.name, query))
                .map(|a| a.id)
                .collect();
            Ok(s.sorted_books()
                .into_iter()
                .filter(|b| {
                    contains_ci(&b.title, query)
                        || b.author_ids.first().is_some_and(|id| author_ids.contains(id))
                })
                .map(|b| s.with_authors(b))
                .collect())
        }))
    }

    fn filter_books<'a>(
        &'a self,
        subject: Option<&'a str>,
        query: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<BookWithAuthors>> {
        ready(self.with_state(|s| {
            let subject_id = match subject {
                Some(name) => Some(
                    s.subjects
                        .values()
                        .find(|sub| sub.name == name)
                        .map(|sub| sub.id)
                        .ok_or(LibraryError::NotFound(Entity::Subject))?,
                ),
                None => None,
            };
            let author_id = query.and_then(|q| {
                let mut matches: Vec<&Author> =
                    s.authors.values().filter(|a| contains_ci(&a.name, q)).collect();
                matches.sort_by_key(|a| a.id);
                matches.first().map(|a| a.id)
            });

            Ok(s.sorted_books()
                .into_iter()
                .filter(|b| subject_id.is_none_or(|id| b.subject_id == Some(id)))
                .filter(|b| match (author_id, query) {
                    (Some(id), _) => b.author_ids.iter().take(2).any(|a| *a == id),
                    (None, Some(q)) => contains_ci(&b.title, q),
                    (None, None) => true,
                })
                .map(|b| s.with_authors(b))
                .collect())
        }))
    }

    fn list_streams(&self) -> StoreFuture<'_, Vec<String>> {
        ready(self.with_state(|s| {
            let mut streams: Vec<String> = s
                .books
                .values()
                .filter_map(|b| b.stream.clone())
                .filter(|stream| !stream.is_empty())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            streams.sort();
            Ok(streams)
        }))
    }

    fn autocomplete_titles<'a>(
        &'a self,
        fragment: &'a str,
        limit: i64,
    ) -> StoreFuture<'a, Vec<String>> {
        ready(self.with_state(|s| {
            Ok(s.sorted_books()
                .into_iter()
                .filter(|b| contains_ci(&b.title, fragment))
                .take(usize::try_from(limit).unwrap_or(0))
                .map(|b| b.title.clone())
                .collect())
        }))
    }

    fn update_book<'a>(
        &'a self,
        book_id: BookId,
        update: &'a BookUpdate,
    ) -> StoreFuture<'a, Book> {
        ready(self.with_state(|s| {
            let book = s
                .books
                .get_mut(&book_id)
                .ok_or(LibraryError::NotFound(Entity::Book))?;
            update.apply_to(book);
            Ok(book.clone())
        }))
    }

    fn list_members(&self) -> StoreFuture<'_, Vec<Member>> {
        ready(self.with_state(|s| {
            let mut members: Vec<Member> = s
                .users
                .values()
                .map(|u| Member {
                    id: u.id,
                    user_code: u.user_code.clone(),
                    role: u.role,
                    profile: u.profile_id.and_then(|id| s.profiles.get(&id).cloned()),
                })
                .collect();
            members.sort_by(|a, b| a.user_code.cmp(&b.user_code));
            Ok(members)
        }))
    }

    fn list_loans(&self) -> StoreFuture<'_, Vec<LoanView>> {
        ready(self.with_state(|s| {
            let mut loans: Vec<&Loan> = s.loans.values().collect();
            loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
            Ok(loans.into_iter().map(|l| s.loan_view(l)).collect())
        }))
    }

    fn user_loans(&self, user_id: UserId) -> StoreFuture<'_, Vec<LoanView>> {
        ready(self.with_state(|s| {
            let Some(profile_id) = s.profile_of(user_id)? else {
                return Ok(Vec::new());
            };
            let mut loans: Vec<&Loan> = s
                .loans
                .values()
                .filter(|l| l.profile_id == profile_id && !l.returned)
                .collect();
            loans.sort_by_key(|l| l.due_date);
            Ok(loans.into_iter().map(|l| s.loan_view(l)).collect())
        }))
    }

    fn user_history(&self, user_id: UserId) -> StoreFuture<'_, Vec<HistoryEntry>> {
        ready(self.with_state(|s| {
            let Some(profile_id) = s.profile_of(user_id)? else {
                return Ok(Vec::new());
            };
            let mut entries: Vec<HistoryEntry> = s
                .history
                .iter()
                .filter(|h| h.profile_id == profile_id)
                .map(|h| HistoryEntry {
                    book: s.book_summary(h.book_id),
                    borrowed_at: h.borrowed_at,
                    returned_at: h.returned_at,
                    penalty_amount: h.penalty_amount,
                })
                .collect();
            entries.sort_by(|a, b| b.returned_at.cmp(&a.returned_at));
            Ok(entries)
        }))
    }

    fn list_penalties(&self) -> StoreFuture<'_, Vec<PenaltyView>> {
        ready(self.with_state(|s| {
            let mut penalties: Vec<PenaltyView> = s
                .penalties
                .values()
                .map(|p| PenaltyView {
                    penalty: p.clone(),
                    book: s.book_summary(p.book_id),
                    borrower: s.profile_summary(p.profile_id),
                })
                .collect();
            penalties.sort_by(|a, b| b.penalty.amount.cmp(&a.penalty.amount));
            Ok(penalties)
        }))
    }

    fn loans_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<LoanView>> {
        ready(self.with_state(|s| {
            let mut loans: Vec<&Loan> = s
                .loans
                .values()
                .filter(|l| !l.returned && l.due_date >= from && l.due_date <= to)
                .collect();
            loans.sort_by_key(|l| l.due_date);
            Ok(loans.into_iter().map(|l| s.loan_view(l)).collect())
        }))
    }

    fn pending_requests(&self) -> StoreFuture<'_, Vec<RequestView>> {
        ready(self.with_state(|s| {
            let mut pending: Vec<&BorrowRequest> = s
                .requests
                .values()
                .filter(|r| r.status == RequestStatus::Pending)
                .collect();
            pending.sort_by_key(|r| r.created_at);
            Ok(pending
                .into_iter()
                .map(|r| RequestView {
                    request: r.clone(),
                    book: s.book_summary(r.book_id),
                    borrower: s.profile_summary(r.profile_id),
                })
                .collect())
        }))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        ready(self.lock().map(|_| ()))
    }
}
