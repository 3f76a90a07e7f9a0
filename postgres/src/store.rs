//! `PostgreSQL` implementation of [`LibraryStore`].
//!
//! # Concurrency
//!
//! Every lifecycle method runs in one transaction. Borrow requests lock the
//! borrower's profile row and then the book row (`SELECT … FOR UPDATE`, always
//! in that order), so the eligibility verdict is computed on state no other
//! transaction can change before commit. The stock decrement is additionally
//! conditional (`available_copies > 0`), restocks are capped at
//! `total_copies`, and status transitions only fire from the expected state.
//! Partial unique indexes back the one-pending-request and one-active-loan
//! rules.

use crate::rows::{
    BookRow, BookWithAuthorsRow, HistoryRow, LoanRow, LoanViewRow, MemberRow, PenaltyRow,
    PenaltyViewRow, ProfileRow, RequestRow, RequestViewRow, SessionRow, UserRow, author_joins,
    author_name_columns, book_columns, loan_columns, penalty_columns, request_columns,
    summary_columns, summary_joins,
};
use chrono::{DateTime, Utc};
use libris_core::error::{ConflictReason, Entity, LibraryError, Result};
use libris_core::rules::{BorrowPolicy, BorrowSnapshot, PenaltyAssessment, check_eligibility};
use libris_core::store::{LibraryStore, StoreFuture};
use libris_core::types::{
    Book, BookDetails, BookId, BookRef, BookUpdate, BookWithAuthors, BorrowRequest, HistoryEntry,
    Loan, LoanId, LoanView, Member, Penalty, PenaltyId, PenaltyView, Profile, ProfileId,
    RequestBorrow, RequestId, RequestStatus, RequestView, ReturnReceipt, Session, SessionToken,
    UserAccount, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Uuid;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;

/// Map a sqlx error to `LibraryError::Storage` with context.
fn storage(context: &'static str) -> impl Fn(sqlx::Error) -> LibraryError {
    move |e| LibraryError::Storage(format!("{context}: {e}"))
}

/// Translate a unique violation into a conflict; anything else is storage.
fn conflict_on_unique(
    reason: ConflictReason,
    context: &'static str,
) -> impl Fn(sqlx::Error) -> LibraryError {
    move |e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            LibraryError::Conflict(reason)
        }
        _ => LibraryError::Storage(format!("{context}: {e}")),
    }
}

/// `%fragment%` with LIKE metacharacters escaped, for `ILIKE … ESCAPE '\'`.
fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Pool settings for [`PostgresLibraryStore::connect`].
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections in the pool
    pub min_connections: u32,
    /// Time to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// `PostgreSQL`-backed library store.
#[derive(Clone, Debug)]
pub struct PostgresLibraryStore {
    pool: PgPool,
}

impl PostgresLibraryStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `url`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database is unreachable.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(storage("Failed to connect to database"))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LibraryError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn profile_of(&self, user_id: UserId) -> Result<Option<Uuid>> {
        let row: Option<(Option<Uuid>,)> =
            sqlx::query_as("SELECT profile_id FROM users WHERE id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load user"))?;
        row.map(|(profile_id,)| profile_id)
            .ok_or(LibraryError::NotFound(Entity::User))
    }

    /// Put one copy back, never exceeding the owned total. Returns the shelf count.
    async fn restock(conn: &mut PgConnection, book_id: Uuid) -> Result<i32> {
        let updated: Option<(i32,)> = sqlx::query_as(
            "UPDATE books SET available_copies = available_copies + 1 \
             WHERE id = $1 AND available_copies < total_copies \
             RETURNING available_copies",
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("Failed to restock book"))?;

        if let Some((available,)) = updated {
            return Ok(available);
        }
        let (available,): (i32,) =
            sqlx::query_as("SELECT available_copies FROM books WHERE id = $1")
                .bind(book_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(storage("Failed to read stock"))?;
        Ok(available)
    }

    async fn refresh_penalty_cache(conn: &mut PgConnection, profile_id: Uuid) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users SET penalties = COALESCE(
                (SELECT jsonb_agg(jsonb_build_object(
                            'book_id', p.book_id,
                            'amount', p.amount,
                            'days_overdue', p.days_overdue,
                            'created_at', p.created_at)
                        ORDER BY p.created_at)
                 FROM penalties p WHERE p.profile_id = $1),
                '[]'::jsonb)
            WHERE profile_id = $1
            ",
        )
        .bind(profile_id)
        .execute(&mut *conn)
        .await
        .map_err(storage("Failed to refresh penalty cache"))?;
        Ok(())
    }

    async fn decide(
        request_id: RequestId,
        status: RequestStatus,
        now: DateTime<Utc>,
        conn: &mut PgConnection,
    ) -> Result<BorrowRequest> {
        let row: Option<RequestRow> = sqlx::query_as(concat!(
            "UPDATE borrow_requests r SET status = $2, decided_at = $3 \
             WHERE r.id = $1 AND r.status = 'pending' RETURNING ",
            request_columns!("r")
        ))
        .bind(request_id.as_uuid())
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(storage("Failed to update borrow request"))?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let (exists,): (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM borrow_requests WHERE id = $1)")
                        .bind(request_id.as_uuid())
                        .fetch_one(&mut *conn)
                        .await
                        .map_err(storage("Failed to load borrow request"))?;
                Err(if exists {
                    LibraryError::Conflict(ConflictReason::AlreadyDecided)
                } else {
                    LibraryError::NotFound(Entity::Request)
                })
            }
        }
    }
}

impl LibraryStore for PostgresLibraryStore {
    fn resolve_user<'a>(&'a self, user_code: &'a str) -> StoreFuture<'a, UserAccount> {
        Box::pin(async move {
            let row: UserRow = sqlx::query_as(
                "SELECT id, user_code, role, profile_id, penalties FROM users WHERE user_code = $1",
            )
            .bind(user_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load user"))?
            .ok_or(LibraryError::NotFound(Entity::User))?;
            row.try_into()
        })
    }

    fn resolve_user_by_id(&self, user_id: UserId) -> StoreFuture<'_, UserAccount> {
        Box::pin(async move {
            let row: UserRow = sqlx::query_as(
                "SELECT id, user_code, role, profile_id, penalties FROM users WHERE id = $1",
            )
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load user"))?
            .ok_or(LibraryError::NotFound(Entity::User))?;
            row.try_into()
        })
    }

    fn resolve_book<'a>(&'a self, book: &'a BookRef) -> StoreFuture<'a, Book> {
        Box::pin(async move {
            let query = match book {
                BookRef::Id(id) => {
                    sqlx::query_as::<_, BookRow>(concat!(
                        "SELECT ",
                        book_columns!(),
                        " FROM books b WHERE b.id = $1"
                    ))
                    .bind(*id.as_uuid())
                }
                BookRef::Title(title) => {
                    sqlx::query_as::<_, BookRow>(concat!(
                        "SELECT ",
                        book_columns!(),
                        " FROM books b WHERE b.title = $1 ORDER BY b.id LIMIT 1"
                    ))
                    .bind(title.as_str())
                }
            };
            let row = query
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load book"))?
                .ok_or(LibraryError::NotFound(Entity::Book))?;
            Ok(row.into())
        })
    }

    fn resolve_profile<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Profile> {
        Box::pin(async move {
            let row: ProfileRow = sqlx::query_as(
                "SELECT id, student_id, first_name, last_name, email, phone_number, department, \
                 year_level FROM profiles WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load profile"))?
            .ok_or(LibraryError::NotFound(Entity::Profile))?;
            Ok(row.into())
        })
    }

    fn resolve_session(
        &self,
        token: SessionToken,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Session> {
        Box::pin(async move {
            let row: SessionRow = sqlx::query_as(
                "SELECT token, user_id, expires_at FROM sessions \
                 WHERE token = $1 AND expires_at > $2",
            )
            .bind(token.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load session"))?
            .ok_or(LibraryError::NotFound(Entity::Session))?;
            Ok(row.into())
        })
    }

    fn create_borrow_request<'a>(
        &'a self,
        request: &'a RequestBorrow,
        policy: &'a BorrowPolicy,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, BorrowRequest> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(storage("Failed to begin transaction"))?;

            let user: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE user_code = $1")
                .bind(&request.user_code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage("Failed to load user"))?;
            if user.is_none() {
                return Err(LibraryError::NotFound(Entity::User));
            }

            let book: Option<(Uuid,)> = match &request.book {
                BookRef::Id(id) => {
                    sqlx::query_as::<_, (Uuid,)>("SELECT id FROM books WHERE id = $1")
                        .bind(*id.as_uuid())
                }
                BookRef::Title(title) => sqlx::query_as::<_, (Uuid,)>(
                    "SELECT id FROM books WHERE title = $1 ORDER BY id LIMIT 1",
                )
                .bind(title.as_str()),
            }
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to load book"))?;
            let (book_id,) = book.ok_or(LibraryError::NotFound(Entity::Book))?;

            // Lock order: profile, then book
            let (profile_id,): (Uuid,) =
                sqlx::query_as("SELECT id FROM profiles WHERE email = $1 FOR UPDATE")
                    .bind(&request.email)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage("Failed to load profile"))?
                    .ok_or(LibraryError::NotFound(Entity::Profile))?;

            let (available_copies,): (i32,) =
                sqlx::query_as("SELECT available_copies FROM books WHERE id = $1 FOR UPDATE")
                    .bind(book_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage("Failed to lock book"))?;

            let (pending_request_exists, active_loan_exists, outstanding): (bool, bool, i64) =
                sqlx::query_as(
                    r"
                    SELECT
                        EXISTS(SELECT 1 FROM borrow_requests
                               WHERE profile_id = $1 AND book_id = $2 AND status = 'pending'),
                        EXISTS(SELECT 1 FROM loans
                               WHERE profile_id = $1 AND book_id = $2 AND NOT returned),
                        (SELECT COUNT(*) FROM borrow_requests
                         WHERE profile_id = $1 AND status = 'pending')
                        + (SELECT COUNT(*) FROM loans WHERE profile_id = $1 AND NOT returned)
                    ",
                )
                .bind(profile_id)
                .bind(book_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage("Failed to read borrower state"))?;

            check_eligibility(
                &BorrowSnapshot {
                    pending_request_exists,
                    active_loan_exists,
                    available_copies,
                    outstanding,
                },
                policy,
            )?;

            let decremented = sqlx::query(
                "UPDATE books SET available_copies = available_copies - 1 \
                 WHERE id = $1 AND available_copies > 0",
            )
            .bind(book_id)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to take copy"))?;
            if decremented.rows_affected() == 0 {
                return Err(LibraryError::Conflict(ConflictReason::OutOfStock));
            }

            let created = BorrowRequest {
                id: RequestId::new(),
                book_id: BookId::from_uuid(book_id),
                profile_id: ProfileId::from_uuid(profile_id),
                status: RequestStatus::Pending,
                created_at: now,
                decided_at: None,
            };
            sqlx::query(
                "INSERT INTO borrow_requests (id, book_id, profile_id, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(created.id.as_uuid())
            .bind(book_id)
            .bind(profile_id)
            .bind(created.status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(conflict_on_unique(
                ConflictReason::DuplicateRequest,
                "Failed to create borrow request",
            ))?;

            tx.commit()
                .await
                .map_err(storage("Failed to commit borrow request"))?;
            Ok(created)
        })
    }

    fn approve_request(
        &self,
        request_id: RequestId,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Loan> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(storage("Failed to begin transaction"))?;

            let request = Self::decide(request_id, RequestStatus::Approved, now, &mut tx)
                .await?;

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
            sqlx::query(
                "INSERT INTO loans (id, book_id, profile_id, request_id, borrowed_at, due_date) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(loan.id.as_uuid())
            .bind(loan.book_id.as_uuid())
            .bind(loan.profile_id.as_uuid())
            .bind(request_id.as_uuid())
            .bind(now)
            .bind(due_date)
            .execute(&mut *tx)
            .await
            .map_err(conflict_on_unique(
                ConflictReason::AlreadyBorrowed,
                "Failed to create loan",
            ))?;

            tx.commit()
                .await
                .map_err(storage("Failed to commit approval"))?;
            Ok(loan)
        })
    }

    fn reject_request(
        &self,
        request_id: RequestId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, BorrowRequest> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(storage("Failed to begin transaction"))?;

            let rejected = Self::decide(request_id, RequestStatus::Rejected, now, &mut tx)
                .await?;
            Self::restock(&mut tx, *rejected.book_id.as_uuid()).await?;

            tx.commit()
                .await
                .map_err(storage("Failed to commit rejection"))?;
            Ok(rejected)
        })
    }

    fn return_loan(&self, loan_id: LoanId, now: DateTime<Utc>) -> StoreFuture<'_, ReturnReceipt> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(storage("Failed to begin transaction"))?;

            let row: Option<LoanRow> = sqlx::query_as(concat!(
                "UPDATE loans l SET returned = true, returned_at = $2 \
                 WHERE l.id = $1 AND NOT l.returned RETURNING ",
                loan_columns!("l")
            ))
            .bind(loan_id.as_uuid())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to return loan"))?;

            let Some(row) = row else {
                let (exists,): (bool,) =
                    sqlx::query_as("SELECT EXISTS(SELECT 1 FROM loans WHERE id = $1)")
                        .bind(loan_id.as_uuid())
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(storage("Failed to load loan"))?;
                return Err(if exists {
                    LibraryError::Conflict(ConflictReason::AlreadyReturned)
                } else {
                    LibraryError::NotFound(Entity::Loan)
                });
            };
            let loan = Loan::from(row);

            let available_copies = Self::restock(&mut tx, *loan.book_id.as_uuid()).await?;

            let penalty: Option<PenaltyRow> = sqlx::query_as(concat!(
                "UPDATE penalties p SET frozen = true, updated_at = $2 \
                 WHERE p.loan_id = $1 RETURNING ",
                penalty_columns!("p")
            ))
            .bind(loan_id.as_uuid())
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to freeze penalty"))?;
            let penalty = penalty.map(Penalty::from);

            sqlx::query(
                "INSERT INTO book_history \
                 (profile_id, book_id, loan_id, borrowed_at, returned_at, penalty_amount) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(loan.profile_id.as_uuid())
            .bind(loan.book_id.as_uuid())
            .bind(loan_id.as_uuid())
            .bind(loan.borrowed_at)
            .bind(now)
            .bind(penalty.as_ref().map_or(0, |p| p.amount))
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to record history"))?;

            tx.commit()
                .await
                .map_err(storage("Failed to commit return"))?;
            Ok(ReturnReceipt {
                loan,
                available_copies,
                penalty,
            })
        })
    }

    fn overdue_loans(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<Loan>> {
        Box::pin(async move {
            let rows: Vec<LoanRow> = sqlx::query_as(concat!(
                "SELECT ",
                loan_columns!("l"),
                " FROM loans l WHERE NOT l.returned AND l.due_date < $1 ORDER BY l.due_date"
            ))
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list overdue loans"))?;
            Ok(rows.into_iter().map(Loan::from).collect())
        })
    }

    fn upsert_penalty<'a>(
        &'a self,
        loan: &'a Loan,
        assessment: PenaltyAssessment,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Penalty> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(storage("Failed to begin transaction"))?;

            let (returned,): (bool,) =
                sqlx::query_as("SELECT returned FROM loans WHERE id = $1 FOR UPDATE")
                    .bind(loan.id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(storage("Failed to lock loan"))?
                    .ok_or(LibraryError::NotFound(Entity::Loan))?;
            if returned {
                return Err(LibraryError::Conflict(ConflictReason::AlreadyReturned));
            }

            // A frozen row of the same loan is left alone; a row left by an
            // earlier loan of the pair is taken over and unfrozen.
            let upserted: Option<PenaltyRow> = sqlx::query_as(concat!(
                r"
                INSERT INTO penalties AS p
                    (id, profile_id, book_id, loan_id, days_overdue, amount, frozen,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, false, $7, $7)
                ON CONFLICT (profile_id, book_id) DO UPDATE SET
                    loan_id = EXCLUDED.loan_id,
                    days_overdue = EXCLUDED.days_overdue,
                    amount = EXCLUDED.amount,
                    frozen = false,
                    created_at = CASE WHEN p.loan_id = EXCLUDED.loan_id
                                      THEN p.created_at ELSE EXCLUDED.created_at END,
                    updated_at = EXCLUDED.updated_at
                WHERE p.frozen = false OR p.loan_id <> EXCLUDED.loan_id
                RETURNING ",
                penalty_columns!("p")
            ))
            .bind(PenaltyId::new().as_uuid())
            .bind(loan.profile_id.as_uuid())
            .bind(loan.book_id.as_uuid())
            .bind(loan.id.as_uuid())
            .bind(assessment.days_overdue)
            .bind(assessment.amount)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("Failed to upsert penalty"))?;

            let penalty = match upserted {
                Some(row) => row,
                None => sqlx::query_as(concat!(
                    "SELECT ",
                    penalty_columns!("p"),
                    " FROM penalties p WHERE p.profile_id = $1 AND p.book_id = $2"
                ))
                .bind(loan.profile_id.as_uuid())
                .bind(loan.book_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(storage("Failed to load penalty"))?,
            };

            Self::refresh_penalty_cache(&mut tx, *loan.profile_id.as_uuid()).await?;

            tx.commit()
                .await
                .map_err(storage("Failed to commit penalty"))?;
            Ok(penalty.into())
        })
    }

    fn get_book(&self, book_id: BookId) -> StoreFuture<'_, Book> {
        Box::pin(async move {
            let row: BookRow = sqlx::query_as(concat!(
                "SELECT ",
                book_columns!(),
                " FROM books b WHERE b.id = $1"
            ))
            .bind(book_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load book"))?
            .ok_or(LibraryError::NotFound(Entity::Book))?;
            Ok(row.into())
        })
    }

    fn list_books(&self) -> StoreFuture<'_, Vec<Book>> {
        Box::pin(async move {
            let rows: Vec<BookRow> = sqlx::query_as(concat!(
                "SELECT ",
                book_columns!(),
                " FROM books b ORDER BY b.title, b.id"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list books"))?;
            Ok(rows.into_iter().map(Book::from).collect())
        })
    }

    fn book_details(&self, book_id: BookId, limit: i64) -> StoreFuture<'_, BookDetails> {
        Box::pin(async move {
            let book = self.get_book(book_id).await?;
            let rows: Vec<BookRow> = sqlx::query_as(concat!(
                "SELECT ",
                book_columns!(),
                " FROM books b WHERE b.id <> $1 ORDER BY b.title, b.id LIMIT $2"
            ))
            .bind(book_id.as_uuid())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to load recommendations"))?;
            Ok(BookDetails {
                book,
                recommendations: rows.into_iter().map(Book::from).collect(),
            })
        })
    }

    fn search_books<'a>(&'a self, query: &'a str) -> StoreFuture<'a, Vec<BookWithAuthors>> {
        Box::pin(async move {
            let rows: Vec<BookWithAuthorsRow> = sqlx::query_as(concat!(
                "SELECT ",
                book_columns!(),
                ", ",
                author_name_columns!(),
                " FROM books b",
                author_joins!(),
                " WHERE b.title ILIKE $1 ESCAPE '\\' OR a1.name ILIKE $1 ESCAPE '\\' \
                 ORDER BY b.title, b.id"
            ))
            .bind(contains_pattern(query))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to search books"))?;
            Ok(rows.into_iter().map(BookWithAuthors::from).collect())
        })
    }

    fn filter_books<'a>(
        &'a self,
        subject: Option<&'a str>,
        query: Option<&'a str>,
    ) -> StoreFuture<'a, Vec<BookWithAuthors>> {
        Box::pin(async move {
            let subject_id = match subject {
                Some(name) => {
                    let (id,): (i32,) = sqlx::query_as("SELECT id FROM subjects WHERE name = $1")
                        .bind(name)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(storage("Failed to load subject"))?
                        .ok_or(LibraryError::NotFound(Entity::Subject))?;
                    Some(id)
                }
                None => None,
            };

            let author_id = match query {
                Some(q) => sqlx::query_as::<_, (i32,)>(
                    "SELECT id FROM authors WHERE name ILIKE $1 ESCAPE '\\' ORDER BY id LIMIT 1",
                )
                .bind(contains_pattern(q))
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load author"))?
                .map(|(id,)| id),
                None => None,
            };
            let title_pattern = match (author_id, query) {
                (None, Some(q)) => Some(contains_pattern(q)),
                _ => None,
            };

            let rows: Vec<BookWithAuthorsRow> = sqlx::query_as(concat!(
                "SELECT ",
                book_columns!(),
                ", ",
                author_name_columns!(),
                " FROM books b",
                author_joins!(),
                " WHERE ($1::int IS NULL OR b.subject_id = $1) \
                 AND ($2::int IS NULL OR b.author_id1 = $2 OR b.author_id2 = $2) \
                 AND ($3::text IS NULL OR b.title ILIKE $3 ESCAPE '\\') \
                 ORDER BY b.title, b.id"
            ))
            .bind(subject_id)
            .bind(author_id)
            .bind(title_pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to filter books"))?;
            Ok(rows.into_iter().map(BookWithAuthors::from).collect())
        })
    }

    fn list_streams(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT stream FROM books \
                 WHERE stream IS NOT NULL AND stream <> '' ORDER BY stream",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list streams"))?;
            Ok(rows.into_iter().map(|(stream,)| stream).collect())
        })
    }

    fn autocomplete_titles<'a>(
        &'a self,
        fragment: &'a str,
        limit: i64,
    ) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT title FROM books WHERE title ILIKE $1 ESCAPE '\\' \
                 ORDER BY title, id LIMIT $2",
            )
            .bind(contains_pattern(fragment))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to autocomplete titles"))?;
            Ok(rows.into_iter().map(|(title,)| title).collect())
        })
    }

    fn update_book<'a>(
        &'a self,
        book_id: BookId,
        update: &'a BookUpdate,
    ) -> StoreFuture<'a, Book> {
        Box::pin(async move {
            let authors = update.author_ids.as_deref();
            let row: BookRow = sqlx::query_as(concat!(
                r"
                UPDATE books b SET
                    catalog_no = COALESCE($2, b.catalog_no),
                    title = COALESCE($3, b.title),
                    subtitle = COALESCE($4, b.subtitle),
                    language_code = COALESCE($5, b.language_code),
                    author_id1 = CASE WHEN $6 THEN $7 ELSE b.author_id1 END,
                    author_id2 = CASE WHEN $6 THEN $8 ELSE b.author_id2 END,
                    place_of_publication = COALESCE($9, b.place_of_publication),
                    publisher_id = COALESCE($10, b.publisher_id),
                    year_of_publication = COALESCE($11, b.year_of_publication),
                    subject_id = COALESCE($12, b.subject_id),
                    image_url = COALESCE($13, b.image_url)
                WHERE b.id = $1
                RETURNING ",
                book_columns!()
            ))
            .bind(book_id.as_uuid())
            .bind(update.catalog_no.as_deref())
            .bind(update.title.as_deref())
            .bind(update.subtitle.as_deref())
            .bind(update.language_code.as_deref())
            .bind(authors.is_some())
            .bind(authors.and_then(|ids| ids.first().copied()))
            .bind(authors.and_then(|ids| ids.get(1).copied()))
            .bind(update.place_of_publication.as_deref())
            .bind(update.publisher_id)
            .bind(update.year_of_publication)
            .bind(update.subject_id)
            .bind(update.image_url.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to update book"))?
            .ok_or(LibraryError::NotFound(Entity::Book))?;
            Ok(row.into())
        })
    }

    fn list_members(&self) -> StoreFuture<'_, Vec<Member>> {
        Box::pin(async move {
            let rows: Vec<MemberRow> = sqlx::query_as(
                "SELECT u.id, u.user_code, u.role, u.profile_id, p.student_id, p.first_name, \
                 p.last_name, p.email, p.phone_number, p.department, p.year_level \
                 FROM users u LEFT JOIN profiles p ON p.id = u.profile_id \
                 ORDER BY u.user_code",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list members"))?;
            rows.into_iter().map(Member::try_from).collect()
        })
    }

    fn list_loans(&self) -> StoreFuture<'_, Vec<LoanView>> {
        Box::pin(async move {
            let rows: Vec<LoanViewRow> = sqlx::query_as(concat!(
                "SELECT ",
                loan_columns!("l"),
                ", ",
                summary_columns!(),
                " FROM loans l",
                summary_joins!("l"),
                " ORDER BY l.borrowed_at DESC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list loans"))?;
            Ok(rows.into_iter().map(LoanView::from).collect())
        })
    }

    fn user_loans(&self, user_id: UserId) -> StoreFuture<'_, Vec<LoanView>> {
        Box::pin(async move {
            let Some(profile_id) = self.profile_of(user_id).await? else {
                return Ok(Vec::new());
            };
            let rows: Vec<LoanViewRow> = sqlx::query_as(concat!(
                "SELECT ",
                loan_columns!("l"),
                ", ",
                summary_columns!(),
                " FROM loans l",
                summary_joins!("l"),
                " WHERE l.profile_id = $1 AND NOT l.returned ORDER BY l.due_date"
            ))
            .bind(profile_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list user loans"))?;
            Ok(rows.into_iter().map(LoanView::from).collect())
        })
    }

    fn user_history(&self, user_id: UserId) -> StoreFuture<'_, Vec<HistoryEntry>> {
        Box::pin(async move {
            let Some(profile_id) = self.profile_of(user_id).await? else {
                return Ok(Vec::new());
            };
            let rows: Vec<HistoryRow> = sqlx::query_as(concat!(
                "SELECT b.id AS book_id, b.title AS book_title, b.image_url AS book_image_url, ",
                author_name_columns!(),
                ", h.borrowed_at, h.returned_at, h.penalty_amount \
                 FROM book_history h JOIN books b ON b.id = h.book_id",
                author_joins!(),
                " WHERE h.profile_id = $1 ORDER BY h.returned_at DESC"
            ))
            .bind(profile_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to load history"))?;
            Ok(rows.into_iter().map(HistoryEntry::from).collect())
        })
    }

    fn list_penalties(&self) -> StoreFuture<'_, Vec<PenaltyView>> {
        Box::pin(async move {
            let rows: Vec<PenaltyViewRow> = sqlx::query_as(concat!(
                "SELECT ",
                penalty_columns!("x"),
                ", ",
                summary_columns!(),
                " FROM penalties x",
                summary_joins!("x"),
                " ORDER BY x.amount DESC, x.created_at"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list penalties"))?;
            Ok(rows.into_iter().map(PenaltyView::from).collect())
        })
    }

    fn loans_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<LoanView>> {
        Box::pin(async move {
            let rows: Vec<LoanViewRow> = sqlx::query_as(concat!(
                "SELECT ",
                loan_columns!("l"),
                ", ",
                summary_columns!(),
                " FROM loans l",
                summary_joins!("l"),
                " WHERE NOT l.returned AND l.due_date BETWEEN $1 AND $2 ORDER BY l.due_date"
            ))
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list due loans"))?;
            Ok(rows.into_iter().map(LoanView::from).collect())
        })
    }

    fn pending_requests(&self) -> StoreFuture<'_, Vec<RequestView>> {
        Box::pin(async move {
            let rows: Vec<RequestViewRow> = sqlx::query_as(concat!(
                "SELECT ",
                request_columns!("r"),
                ", ",
                summary_columns!(),
                " FROM borrow_requests r",
                summary_joins!("r"),
                " WHERE r.status = 'pending' ORDER BY r.created_at"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to list pending requests"))?;
            rows.into_iter().map(RequestView::try_from).collect()
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(storage("Database ping failed"))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(contains_pattern("os"), "%os%");
        assert_eq!(contains_pattern("100%_\\"), "%100\\%\\_\\\\%");
    }
}
