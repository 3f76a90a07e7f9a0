//! Error taxonomy for lending operations.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Entity kinds that can be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// Identity record (login account).
    User,
    /// Catalog entry.
    Book,
    /// Student profile linked to an identity.
    Profile,
    /// Active or past loan.
    Loan,
    /// Borrow request.
    Request,
    /// Catalog subject.
    Subject,
    /// Bearer session.
    Session,
}

impl Entity {
    /// Human-readable message returned to clients.
    #[must_use]
    pub const fn not_found_message(self) -> &'static str {
        match self {
            Self::User => "User does not exist",
            Self::Book => "Book not found",
            Self::Profile => "Profile is not created",
            Self::Loan => "Loan not found",
            Self::Request => "Borrow request not found",
            Self::Subject => "Subject not found",
            Self::Session => "Session not found",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Book => "book",
            Self::Profile => "profile",
            Self::Loan => "loan",
            Self::Request => "request",
            Self::Subject => "subject",
            Self::Session => "session",
        };
        f.write_str(name)
    }
}

/// Reasons a lifecycle transition is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// A pending request already exists for this (book, profile) pair.
    DuplicateRequest,
    /// The profile holds an unreturned loan of this book.
    AlreadyBorrowed,
    /// No copies are available.
    OutOfStock,
    /// Pending requests plus active loans would exceed the limit.
    BorrowLimitExceeded,
    /// The request was already approved or rejected.
    AlreadyDecided,
    /// The loan was already returned.
    AlreadyReturned,
}

impl ConflictReason {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DuplicateRequest => "duplicate_request",
            Self::AlreadyBorrowed => "already_borrowed",
            Self::OutOfStock => "out_of_stock",
            Self::BorrowLimitExceeded => "borrow_limit_exceeded",
            Self::AlreadyDecided => "already_decided",
            Self::AlreadyReturned => "already_returned",
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::DuplicateRequest => "You already have a pending borrow request for this book",
            Self::AlreadyBorrowed => "You have already borrowed this book",
            Self::OutOfStock => "Book is currently out of stock",
            Self::BorrowLimitExceeded => {
                "You cannot borrow more than two books (including pending requests)"
            }
            Self::AlreadyDecided => "Borrow request has already been decided",
            Self::AlreadyReturned => "Loan has already been returned",
        }
    }
}

/// Errors produced by the lifecycle manager and its stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LibraryError {
    /// A referenced entity does not exist.
    #[error("{} ({0})", .0.not_found_message())]
    NotFound(Entity),

    /// An eligibility rule or state transition was violated.
    #[error("{}", .0.message())]
    Conflict(ConflictReason),

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database or other infrastructure failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LibraryError {
    /// Shorthand for a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// True for infrastructure failures (as opposed to client errors).
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_codes_are_snake_case() {
        assert_eq!(ConflictReason::OutOfStock.code(), "out_of_stock");
        assert_eq!(
            ConflictReason::BorrowLimitExceeded.code(),
            "borrow_limit_exceeded"
        );
    }

    #[test]
    fn not_found_display_names_entity() {
        let err = LibraryError::NotFound(Entity::Profile);
        assert_eq!(err.to_string(), "Profile is not created (profile)");
    }

    #[test]
    fn only_storage_is_internal() {
        assert!(LibraryError::storage("pool closed").is_internal());
        assert!(!LibraryError::Conflict(ConflictReason::OutOfStock).is_internal());
    }
}
