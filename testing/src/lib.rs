//! # Libris Testing
//!
//! Testing utilities for the Libris lending core.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryLibraryStore`]: a `LibraryStore` that keeps all state behind one
//!   mutex, honouring the same atomicity contract as the `PostgreSQL` store
//! - [`LibraryFixture`]: seed data builders for books, identities and profiles
//!
//! ## Example
//!
//! ```
//! use libris_testing::{LibraryFixture, ManualClock};
//! use libris_core::{BorrowLifecycle, BookRef, RequestBorrow};
//! use std::sync::Arc;
//!
//! # async fn example() -> libris_core::Result<()> {
//! let fixture = LibraryFixture::new();
//! let book = fixture.book("Operating Systems", 1);
//! let student = fixture.student("S100", "ada@college.edu");
//!
//! let clock = Arc::new(ManualClock::default());
//! let lifecycle = BorrowLifecycle::new(fixture.store_arc(), clock);
//!
//! lifecycle
//!     .request_borrow(RequestBorrow {
//!         user_code: student.user.user_code.clone(),
//!         book: BookRef::Title(book.title.clone()),
//!         email: student.profile.email.clone(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod fixtures;
pub mod memory_store;

/// Mock implementations of environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use libris_core::environment::Clock;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use libris_testing::mocks::FixedClock;
    /// use libris_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Used to walk a loan past its due date without sleeping.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut guard = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard += by;
        }

        /// Jump to an absolute time.
        pub fn set(&self, time: DateTime<Utc>) {
            let mut guard = self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = time;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(test_clock().now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self
                .time
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_735_689_600))
    }
}

// Re-export commonly used items
pub use fixtures::{LibraryFixture, SeededStudent};
pub use memory_store::InMemoryLibraryStore;
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use libris_core::environment::Clock;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(time1.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::minutes(47));
        assert_eq!(clock.now() - start, Duration::minutes(47));
    }
}
