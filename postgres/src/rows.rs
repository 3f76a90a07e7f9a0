//! Row types and the column lists that feed them.
//!
//! Column lists are macros so they can be spliced into `concat!` and the
//! queries stay `&'static str`.

use chrono::{DateTime, Utc};
use libris_core::types::{
    Book, BookId, BookSummary, BookWithAuthors, BorrowRequest, HistoryEntry, Loan, LoanId,
    LoanView, Member, Penalty, PenaltyId, PenaltySummary, PenaltyView, Profile, ProfileId,
    ProfileSummary, RequestId, RequestStatus, RequestView, Role, Session, SessionToken,
    UserAccount, UserId,
};
use libris_core::{LibraryError, Result};
use sqlx::types::{Json, Uuid};

/// Book columns, table alias `b`.
macro_rules! book_columns {
    () => {
        "b.id, b.catalog_no, b.title, b.subtitle, b.language_code, b.author_id1, b.author_id2, \
         b.place_of_publication, b.publisher_id, b.year_of_publication, b.subject_id, b.stream, \
         b.image_url, b.total_copies, b.available_copies"
    };
}

/// Author name columns; pairs with [`author_joins!`].
macro_rules! author_name_columns {
    () => {
        "a1.name AS author_name1, a2.name AS author_name2"
    };
}

macro_rules! author_joins {
    () => {
        " LEFT JOIN authors a1 ON a1.id = b.author_id1 LEFT JOIN authors a2 ON a2.id = b.author_id2"
    };
}

/// Book and borrower summary columns of a loan, penalty or request row.
macro_rules! summary_columns {
    () => {
        "b.title AS book_title, b.image_url AS book_image_url, \
         a1.name AS author_name1, a2.name AS author_name2, \
         p.student_id, p.first_name, p.last_name, p.email"
    };
}

/// Joins backing [`summary_columns!`] for a record aliased `$alias`.
macro_rules! summary_joins {
    ($alias:literal) => {
        concat!(
            " JOIN books b ON b.id = ",
            $alias,
            ".book_id",
            author_joins!(),
            " JOIN profiles p ON p.id = ",
            $alias,
            ".profile_id"
        )
    };
}

macro_rules! loan_columns {
    ($alias:literal) => {
        concat!(
            $alias, ".id, ", $alias, ".book_id, ", $alias, ".profile_id, ", $alias,
            ".request_id, ", $alias, ".borrowed_at, ", $alias, ".due_date, ", $alias,
            ".returned, ", $alias, ".returned_at"
        )
    };
}

macro_rules! penalty_columns {
    ($alias:literal) => {
        concat!(
            $alias, ".id, ", $alias, ".profile_id, ", $alias, ".book_id, ", $alias,
            ".loan_id, ", $alias, ".days_overdue, ", $alias, ".amount, ", $alias, ".frozen, ",
            $alias, ".created_at, ", $alias, ".updated_at"
        )
    };
}

macro_rules! request_columns {
    ($alias:literal) => {
        concat!(
            $alias, ".id, ", $alias, ".book_id, ", $alias, ".profile_id, ", $alias,
            ".status, ", $alias, ".created_at, ", $alias, ".decided_at"
        )
    };
}

pub(crate) use {
    author_joins, author_name_columns, book_columns, loan_columns, penalty_columns,
    request_columns, summary_columns, summary_joins,
};

fn author_names(first: Option<String>, second: Option<String>) -> Vec<String> {
    first.into_iter().chain(second).collect()
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    id: Uuid,
    catalog_no: Option<String>,
    title: String,
    subtitle: Option<String>,
    language_code: Option<String>,
    author_id1: Option<i32>,
    author_id2: Option<i32>,
    place_of_publication: Option<String>,
    publisher_id: Option<i32>,
    year_of_publication: Option<i32>,
    subject_id: Option<i32>,
    stream: Option<String>,
    image_url: Option<String>,
    total_copies: i32,
    available_copies: i32,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: BookId::from_uuid(row.id),
            catalog_no: row.catalog_no,
            title: row.title,
            subtitle: row.subtitle,
            language_code: row.language_code,
            author_ids: row.author_id1.into_iter().chain(row.author_id2).collect(),
            place_of_publication: row.place_of_publication,
            publisher_id: row.publisher_id,
            year_of_publication: row.year_of_publication,
            subject_id: row.subject_id,
            stream: row.stream,
            image_url: row.image_url,
            total_copies: row.total_copies,
            available_copies: row.available_copies,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookWithAuthorsRow {
    #[sqlx(flatten)]
    book: BookRow,
    author_name1: Option<String>,
    author_name2: Option<String>,
}

impl From<BookWithAuthorsRow> for BookWithAuthors {
    fn from(row: BookWithAuthorsRow) -> Self {
        Self {
            book: row.book.into(),
            author_names: author_names(row.author_name1, row.author_name2),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProfileRow {
    id: Uuid,
    student_id: String,
    first_name: String,
    last_name: String,
    email: String,
    phone_number: Option<String>,
    department: Option<String>,
    year_level: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: ProfileId::from_uuid(row.id),
            student_id: row.student_id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone_number: row.phone_number,
            department: row.department,
            year_level: row.year_level,
        }
    }
}

fn parse_role(role: &str) -> Result<Role> {
    role.parse().map_err(LibraryError::Storage)
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    user_code: String,
    role: String,
    profile_id: Option<Uuid>,
    penalties: Json<Vec<PenaltySummary>>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = LibraryError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: UserId::from_uuid(row.id),
            user_code: row.user_code,
            role: parse_role(&row.role)?,
            profile_id: row.profile_id.map(ProfileId::from_uuid),
            penalties: row.penalties.0,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MemberRow {
    id: Uuid,
    user_code: String,
    role: String,
    profile_id: Option<Uuid>,
    student_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone_number: Option<String>,
    department: Option<String>,
    year_level: Option<String>,
}

impl TryFrom<MemberRow> for Member {
    type Error = LibraryError;

    fn try_from(row: MemberRow) -> Result<Self> {
        let profile = row.profile_id.map(|id| Profile {
            id: ProfileId::from_uuid(id),
            student_id: row.student_id.unwrap_or_default(),
            first_name: row.first_name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            phone_number: row.phone_number,
            department: row.department,
            year_level: row.year_level,
        });
        Ok(Self {
            id: UserId::from_uuid(row.id),
            user_code: row.user_code,
            role: parse_role(&row.role)?,
            profile,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    token: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            token: SessionToken::from_uuid(row.token),
            user_id: UserId::from_uuid(row.user_id),
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RequestRow {
    id: Uuid,
    book_id: Uuid,
    profile_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<RequestRow> for BorrowRequest {
    type Error = LibraryError;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(Self {
            id: RequestId::from_uuid(row.id),
            book_id: BookId::from_uuid(row.book_id),
            profile_id: ProfileId::from_uuid(row.profile_id),
            status: row.status.parse::<RequestStatus>().map_err(LibraryError::Storage)?,
            created_at: row.created_at,
            decided_at: row.decided_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LoanRow {
    id: Uuid,
    book_id: Uuid,
    profile_id: Uuid,
    request_id: Option<Uuid>,
    borrowed_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    returned: bool,
    returned_at: Option<DateTime<Utc>>,
}

impl From<LoanRow> for Loan {
    fn from(row: LoanRow) -> Self {
        Self {
            id: LoanId::from_uuid(row.id),
            book_id: BookId::from_uuid(row.book_id),
            profile_id: ProfileId::from_uuid(row.profile_id),
            request_id: row.request_id.map(RequestId::from_uuid),
            borrowed_at: row.borrowed_at,
            due_date: row.due_date,
            returned: row.returned,
            returned_at: row.returned_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PenaltyRow {
    id: Uuid,
    profile_id: Uuid,
    book_id: Uuid,
    loan_id: Uuid,
    days_overdue: i64,
    amount: i64,
    frozen: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PenaltyRow> for Penalty {
    fn from(row: PenaltyRow) -> Self {
        Self {
            id: PenaltyId::from_uuid(row.id),
            profile_id: ProfileId::from_uuid(row.profile_id),
            book_id: BookId::from_uuid(row.book_id),
            loan_id: LoanId::from_uuid(row.loan_id),
            days_overdue: row.days_overdue,
            amount: row.amount,
            frozen: row.frozen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Book and borrower fields selected by [`summary_columns!`].
#[derive(sqlx::FromRow)]
pub(crate) struct SummaryRow {
    book_title: String,
    book_image_url: Option<String>,
    author_name1: Option<String>,
    author_name2: Option<String>,
    student_id: String,
    first_name: String,
    last_name: String,
    email: String,
}

impl SummaryRow {
    fn split(self, book_id: BookId, profile_id: ProfileId) -> (BookSummary, ProfileSummary) {
        (
            BookSummary {
                id: book_id,
                title: self.book_title,
                authors: author_names(self.author_name1, self.author_name2),
                image_url: self.book_image_url,
            },
            ProfileSummary {
                id: profile_id,
                student_id: self.student_id,
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
            },
        )
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LoanViewRow {
    #[sqlx(flatten)]
    loan: LoanRow,
    #[sqlx(flatten)]
    summary: SummaryRow,
}

impl From<LoanViewRow> for LoanView {
    fn from(row: LoanViewRow) -> Self {
        let loan = Loan::from(row.loan);
        let (book, borrower) = row.summary.split(loan.book_id, loan.profile_id);
        Self {
            loan,
            book,
            borrower,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PenaltyViewRow {
    #[sqlx(flatten)]
    penalty: PenaltyRow,
    #[sqlx(flatten)]
    summary: SummaryRow,
}

impl From<PenaltyViewRow> for PenaltyView {
    fn from(row: PenaltyViewRow) -> Self {
        let penalty = Penalty::from(row.penalty);
        let (book, borrower) = row.summary.split(penalty.book_id, penalty.profile_id);
        Self {
            penalty,
            book,
            borrower,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RequestViewRow {
    #[sqlx(flatten)]
    request: RequestRow,
    #[sqlx(flatten)]
    summary: SummaryRow,
}

impl TryFrom<RequestViewRow> for RequestView {
    type Error = LibraryError;

    fn try_from(row: RequestViewRow) -> Result<Self> {
        let request = BorrowRequest::try_from(row.request)?;
        let (book, borrower) = row.summary.split(request.book_id, request.profile_id);
        Ok(Self {
            request,
            book,
            borrower,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    book_id: Uuid,
    book_title: String,
    book_image_url: Option<String>,
    author_name1: Option<String>,
    author_name2: Option<String>,
    borrowed_at: DateTime<Utc>,
    returned_at: DateTime<Utc>,
    penalty_amount: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            book: BookSummary {
                id: BookId::from_uuid(row.book_id),
                title: row.book_title,
                authors: author_names(row.author_name1, row.author_name2),
                image_url: row.book_image_url,
            },
            borrowed_at: row.borrowed_at,
            returned_at: row.returned_at,
            penalty_amount: row.penalty_amount,
        }
    }
}
