//! Domain types for the library.
//!
//! Borrow requests, loans and penalties reference the borrower's *profile*.
//! The identity record ([`UserAccount`]) links to that profile and carries a
//! denormalised copy of its penalties for cheap display.

use crate::error::LibraryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a catalog entry
    BookId
);
uuid_id!(
    /// Unique identifier for an identity record
    UserId
);
uuid_id!(
    /// Unique identifier for a student profile
    ProfileId
);
uuid_id!(
    /// Unique identifier for a borrow request
    RequestId
);
uuid_id!(
    /// Unique identifier for a loan
    LoanId
);
uuid_id!(
    /// Unique identifier for a penalty record
    PenaltyId
);
uuid_id!(
    /// Opaque bearer token of a session
    SessionToken
);

// ============================================================================
// Catalog
// ============================================================================

/// A catalog entry with its stock counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book identifier
    pub id: BookId,
    /// Library catalog number
    pub catalog_no: Option<String>,
    /// Title
    pub title: String,
    /// Subtitle
    pub subtitle: Option<String>,
    /// Language code
    pub language_code: Option<String>,
    /// Primary and optional secondary author
    pub author_ids: Vec<i32>,
    /// Place of publication
    pub place_of_publication: Option<String>,
    /// Publisher reference
    pub publisher_id: Option<i32>,
    /// Year of publication
    pub year_of_publication: Option<i32>,
    /// Subject reference
    pub subject_id: Option<i32>,
    /// Academic stream the book is shelved under
    pub stream: Option<String>,
    /// Cover image URL
    pub image_url: Option<String>,
    /// Copies owned by the library
    pub total_copies: i32,
    /// Copies currently on the shelf
    pub available_copies: i32,
}

impl Book {
    /// True if at least one copy is on the shelf.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.available_copies > 0
    }

    /// `0 <= available_copies <= total_copies`
    #[must_use]
    pub const fn stock_is_consistent(&self) -> bool {
        self.available_copies >= 0 && self.available_copies <= self.total_copies
    }
}

/// Author record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author identifier
    pub id: i32,
    /// Display name
    pub name: String,
}

/// Subject record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject identifier
    pub id: i32,
    /// Subject name
    pub name: String,
}

/// Book plus resolved author names, for search results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookWithAuthors {
    /// The catalog entry
    #[serde(flatten)]
    pub book: Book,
    /// Names of the referenced authors, in `author_ids` order
    pub author_names: Vec<String>,
}

/// Book detail page: the book and other titles to suggest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookDetails {
    /// The requested book
    pub book: Book,
    /// Other catalog entries
    pub recommendations: Vec<Book>,
}

/// Partial catalog update. `None` leaves a field untouched.
///
/// Stock counters are deliberately absent: they are owned by the lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BookUpdate {
    /// Catalog number
    pub catalog_no: Option<String>,
    /// Title
    pub title: Option<String>,
    /// Subtitle
    pub subtitle: Option<String>,
    /// Language code
    pub language_code: Option<String>,
    /// Author references (one or two)
    pub author_ids: Option<Vec<i32>>,
    /// Place of publication
    pub place_of_publication: Option<String>,
    /// Publisher reference
    pub publisher_id: Option<i32>,
    /// Year of publication
    pub year_of_publication: Option<i32>,
    /// Subject reference
    pub subject_id: Option<i32>,
    /// Cover image URL
    pub image_url: Option<String>,
}

impl BookUpdate {
    /// Reject updates that would break catalog invariants.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank title or an author list that is not one or
    /// two entries long.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(LibraryError::Validation("Title cannot be empty".to_string()));
        }
        if let Some(ids) = &self.author_ids {
            if ids.is_empty() || ids.len() > 2 {
                return Err(LibraryError::Validation(
                    "A book has one or two authors".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply the update to a book in place.
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(v) = &self.catalog_no {
            book.catalog_no = Some(v.clone());
        }
        if let Some(v) = &self.title {
            book.title.clone_from(v);
        }
        if let Some(v) = &self.subtitle {
            book.subtitle = Some(v.clone());
        }
        if let Some(v) = &self.language_code {
            book.language_code = Some(v.clone());
        }
        if let Some(v) = &self.author_ids {
            book.author_ids.clone_from(v);
        }
        if let Some(v) = &self.place_of_publication {
            book.place_of_publication = Some(v.clone());
        }
        if let Some(v) = self.publisher_id {
            book.publisher_id = Some(v);
        }
        if let Some(v) = self.year_of_publication {
            book.year_of_publication = Some(v);
        }
        if let Some(v) = self.subject_id {
            book.subject_id = Some(v);
        }
        if let Some(v) = &self.image_url {
            book.image_url = Some(v.clone());
        }
    }
}

/// How a borrow action names the book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookRef {
    /// By catalog identifier
    Id(BookId),
    /// By exact title
    Title(String),
}

impl BookRef {
    /// Interpret free text: a UUID is an id, anything else a title.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        Uuid::parse_str(trimmed).map_or_else(
            |_| Self::Title(trimmed.to_string()),
            |uuid| Self::Id(BookId::from_uuid(uuid)),
        )
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Account role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular borrower
    Student,
    /// Librarian; may approve and reject requests
    Admin,
}

impl Role {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identity record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Identity identifier
    pub id: UserId,
    /// Login code (student number or staff code)
    pub user_code: String,
    /// Role
    pub role: Role,
    /// Linked profile, once created
    pub profile_id: Option<ProfileId>,
    /// Cached copy of this user's penalties, refreshed by every accrual tick
    pub penalties: Vec<PenaltySummary>,
}

/// Student profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile identifier
    pub id: ProfileId,
    /// Student number
    pub student_id: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Email address (unique)
    pub email: String,
    /// Phone number
    pub phone_number: Option<String>,
    /// Department
    pub department: Option<String>,
    /// Year of study
    pub year_level: Option<String>,
}

impl Profile {
    /// Display summary.
    #[must_use]
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            student_id: self.student_id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Member listing row: identity joined with its profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Member {
    /// Identity identifier
    pub id: UserId,
    /// Login code
    pub user_code: String,
    /// Role
    pub role: Role,
    /// Profile, if one was created
    pub profile: Option<Profile>,
}

/// Bearer session issued at login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token
    pub token: SessionToken,
    /// Owner
    pub user_id: UserId,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Lifecycle records
// ============================================================================

/// Borrow request status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Awaiting a librarian decision; holds one copy
    Pending,
    /// Turned into a loan
    Approved,
    /// Declined; copy returned to the shelf
    Rejected,
}

impl RequestStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Approved and rejected are final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown request status: {other}")),
        }
    }
}

/// Input of the borrow action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBorrow {
    /// Identity login code
    pub user_code: String,
    /// Book title or id
    pub book: BookRef,
    /// Email of the borrower's profile
    pub email: String,
}

/// Borrow request record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRequest {
    /// Request identifier
    pub id: RequestId,
    /// Requested book
    pub book_id: BookId,
    /// Borrower
    pub profile_id: ProfileId,
    /// Status
    pub status: RequestStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of approval or rejection
    pub decided_at: Option<DateTime<Utc>>,
}

/// Loan record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Loan identifier
    pub id: LoanId,
    /// Borrowed book
    pub book_id: BookId,
    /// Borrower
    pub profile_id: ProfileId,
    /// Originating request
    pub request_id: Option<RequestId>,
    /// Start of the loan
    pub borrowed_at: DateTime<Utc>,
    /// Due date
    pub due_date: DateTime<Utc>,
    /// Returned flag
    pub returned: bool,
    /// Return time
    pub returned_at: Option<DateTime<Utc>>,
}

/// Overdue penalty, one per (profile, book) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    /// Penalty identifier
    pub id: PenaltyId,
    /// Borrower
    pub profile_id: ProfileId,
    /// Overdue book
    pub book_id: BookId,
    /// Loan the penalty was computed from
    pub loan_id: LoanId,
    /// Simulated days overdue
    pub days_overdue: i64,
    /// Amount in rupees
    pub amount: i64,
    /// Set once the loan is returned; a frozen penalty no longer accrues
    pub frozen: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last recomputation
    pub updated_at: DateTime<Utc>,
}

impl Penalty {
    /// Summary cached on the identity record.
    #[must_use]
    pub const fn summary(&self) -> PenaltySummary {
        PenaltySummary {
            book_id: self.book_id,
            amount: self.amount,
            days_overdue: self.days_overdue,
            created_at: self.created_at,
        }
    }
}

/// Denormalised penalty entry on [`UserAccount`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySummary {
    /// Overdue book
    pub book_id: BookId,
    /// Amount
    pub amount: i64,
    /// Simulated days overdue
    pub days_overdue: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Result of returning a loan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
    /// The loan, now marked returned
    pub loan: Loan,
    /// Shelf count after the return
    pub available_copies: i32,
    /// The frozen penalty, if the loan was overdue
    pub penalty: Option<Penalty>,
}

// ============================================================================
// Display rows
// ============================================================================

/// Book fields shown next to loans and penalties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BookSummary {
    /// Book identifier
    pub id: BookId,
    /// Title
    pub title: String,
    /// Author names
    pub authors: Vec<String>,
    /// Cover image URL
    pub image_url: Option<String>,
}

/// Profile fields shown next to loans and penalties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    /// Profile identifier
    pub id: ProfileId,
    /// Student number
    pub student_id: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Email
    pub email: String,
}

/// Loan joined with book and borrower.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoanView {
    /// The loan
    #[serde(flatten)]
    pub loan: Loan,
    /// Book summary
    pub book: BookSummary,
    /// Borrower summary
    pub borrower: ProfileSummary,
}

/// Penalty joined with book and borrower.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PenaltyView {
    /// The penalty
    #[serde(flatten)]
    pub penalty: Penalty,
    /// Book summary
    pub book: BookSummary,
    /// Borrower summary
    pub borrower: ProfileSummary,
}

/// Pending request joined with book and borrower.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestView {
    /// The request
    #[serde(flatten)]
    pub request: BorrowRequest,
    /// Book summary
    pub book: BookSummary,
    /// Borrower summary
    pub borrower: ProfileSummary,
}

/// Entry of a user's book history, written on return.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Book summary
    pub book: BookSummary,
    /// Start of the loan
    pub borrowed_at: DateTime<Utc>,
    /// Return time
    pub returned_at: DateTime<Utc>,
    /// Penalty frozen at return (0 if the loan was on time)
    pub penalty_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_ref_parses_uuid_as_id() {
        let id = BookId::new();
        assert_eq!(BookRef::parse(&id.to_string()), BookRef::Id(id));
        assert_eq!(
            BookRef::parse("  Operating Systems "),
            BookRef::Title("Operating Systems".to_string())
        );
    }

    #[test]
    fn request_status_round_trips_through_str() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!(RequestStatus::Approved.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
    }

    #[test]
    fn book_update_validation() {
        assert!(BookUpdate::default().validate().is_ok());
        let blank = BookUpdate {
            title: Some("  ".to_string()),
            ..BookUpdate::default()
        };
        assert!(matches!(blank.validate(), Err(LibraryError::Validation(_))));
        let three_authors = BookUpdate {
            author_ids: Some(vec![1, 2, 3]),
            ..BookUpdate::default()
        };
        assert!(three_authors.validate().is_err());
    }

    #[test]
    fn book_update_leaves_stock_alone() {
        let mut book = Book {
            id: BookId::new(),
            catalog_no: None,
            title: "Compilers".to_string(),
            subtitle: None,
            language_code: None,
            author_ids: vec![1],
            place_of_publication: None,
            publisher_id: None,
            year_of_publication: None,
            subject_id: None,
            stream: None,
            image_url: None,
            total_copies: 3,
            available_copies: 1,
        };
        let update = BookUpdate {
            title: Some("Compilers: Principles".to_string()),
            year_of_publication: Some(2006),
            ..BookUpdate::default()
        };
        update.apply_to(&mut book);
        assert_eq!(book.title, "Compilers: Principles");
        assert_eq!(book.year_of_publication, Some(2006));
        assert_eq!((book.total_copies, book.available_copies), (3, 1));
    }
}
