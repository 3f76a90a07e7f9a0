//! Lending rules.
//!
//! Everything here is pure: the stores call these functions from inside their
//! atomic sections, so the verdict always refers to the state that is about to
//! be mutated.

use crate::error::{ConflictReason, LibraryError, Result};
use chrono::{DateTime, Duration, Utc};

/// Limits applied when a borrow request is made or approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorrowPolicy {
    /// Maximum pending requests plus active loans per borrower
    pub max_outstanding: i64,
    /// Time between approval and due date
    pub loan_period: Duration,
}

impl BorrowPolicy {
    /// Due date of a loan approved at `approved_at`.
    #[must_use]
    pub fn due_date(&self, approved_at: DateTime<Utc>) -> DateTime<Utc> {
        approved_at + self.loan_period
    }
}

impl Default for BorrowPolicy {
    /// Two outstanding books; seven simulated days (15 minutes each).
    fn default() -> Self {
        Self {
            max_outstanding: 2,
            loan_period: Duration::minutes(7 * 15),
        }
    }
}

/// State observed for one (book, borrower) pair inside the atomic section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BorrowSnapshot {
    /// A pending request exists for the pair
    pub pending_request_exists: bool,
    /// An unreturned loan exists for the pair
    pub active_loan_exists: bool,
    /// Copies on the shelf
    pub available_copies: i32,
    /// Borrower's pending requests plus unreturned loans, across all books
    pub outstanding: i64,
}

/// Evaluate the eligibility checks in order, failing on the first violation.
///
/// Order: duplicate request, already borrowed, out of stock, borrow limit.
///
/// # Errors
///
/// Returns `LibraryError::Conflict` with the first violated rule.
pub const fn check_eligibility(snapshot: &BorrowSnapshot, policy: &BorrowPolicy) -> Result<()> {
    if snapshot.pending_request_exists {
        return Err(LibraryError::Conflict(ConflictReason::DuplicateRequest));
    }
    if snapshot.active_loan_exists {
        return Err(LibraryError::Conflict(ConflictReason::AlreadyBorrowed));
    }
    if snapshot.available_copies <= 0 {
        return Err(LibraryError::Conflict(ConflictReason::OutOfStock));
    }
    if snapshot.outstanding >= policy.max_outstanding {
        return Err(LibraryError::Conflict(ConflictReason::BorrowLimitExceeded));
    }
    Ok(())
}

/// Penalty arithmetic on a compressed clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PenaltyPolicy {
    /// Real minutes that count as one overdue day
    pub minutes_per_day: i64,
    /// Amount charged per overdue day
    pub rate_per_day: i64,
}

impl Default for PenaltyPolicy {
    /// 15 minutes = 1 day, ₹10 per day.
    fn default() -> Self {
        Self {
            minutes_per_day: 15,
            rate_per_day: 10,
        }
    }
}

/// Outcome of a penalty computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PenaltyAssessment {
    /// Simulated days overdue
    pub days_overdue: i64,
    /// Amount owed
    pub amount: i64,
}

impl PenaltyPolicy {
    /// Recompute the penalty of a loan due at `due_date`, as of `now`.
    ///
    /// Returns `None` unless the loan is strictly past due. Partial minutes
    /// round up; partial days round down. The result depends only on the two
    /// timestamps, so repeated runs never accumulate.
    #[must_use]
    pub fn assess(&self, due_date: DateTime<Utc>, now: DateTime<Utc>) -> Option<PenaltyAssessment> {
        if now <= due_date {
            return None;
        }
        let elapsed_ms = (now - due_date).num_milliseconds();
        let minutes_overdue = (elapsed_ms + 59_999) / 60_000;
        let days_overdue = minutes_overdue / self.minutes_per_day.max(1);
        Some(PenaltyAssessment {
            days_overdue,
            amount: days_overdue * self.rate_per_day,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot() -> BorrowSnapshot {
        BorrowSnapshot {
            pending_request_exists: false,
            active_loan_exists: false,
            available_copies: 1,
            outstanding: 0,
        }
    }

    #[test]
    fn eligible_when_nothing_blocks() {
        assert_eq!(check_eligibility(&snapshot(), &BorrowPolicy::default()), Ok(()));
    }

    #[test]
    fn duplicate_request_wins_over_later_checks() {
        let snap = BorrowSnapshot {
            pending_request_exists: true,
            active_loan_exists: true,
            available_copies: 0,
            outstanding: 5,
        };
        assert_eq!(
            check_eligibility(&snap, &BorrowPolicy::default()),
            Err(LibraryError::Conflict(ConflictReason::DuplicateRequest))
        );
    }

    #[test]
    fn out_of_stock_before_limit() {
        let snap = BorrowSnapshot {
            available_copies: 0,
            outstanding: 2,
            ..snapshot()
        };
        assert_eq!(
            check_eligibility(&snap, &BorrowPolicy::default()),
            Err(LibraryError::Conflict(ConflictReason::OutOfStock))
        );
    }

    #[test]
    fn limit_counts_pending_and_active() {
        let snap = BorrowSnapshot {
            outstanding: 2,
            ..snapshot()
        };
        assert_eq!(
            check_eligibility(&snap, &BorrowPolicy::default()),
            Err(LibraryError::Conflict(ConflictReason::BorrowLimitExceeded))
        );
    }

    #[test]
    fn forty_seven_minutes_is_three_days() {
        let now = Utc::now();
        let due = now - Duration::minutes(47);
        let assessment = PenaltyPolicy::default().assess(due, now);
        assert_eq!(
            assessment,
            Some(PenaltyAssessment {
                days_overdue: 3,
                amount: 30
            })
        );
    }

    #[test]
    fn not_overdue_at_or_before_due_date() {
        let now = Utc::now();
        assert_eq!(PenaltyPolicy::default().assess(now, now), None);
        assert_eq!(
            PenaltyPolicy::default().assess(now + Duration::minutes(3), now),
            None
        );
    }

    #[test]
    fn partial_minute_rounds_up() {
        let now = Utc::now();
        let due = now - Duration::minutes(14) - Duration::seconds(1);
        let assessment = PenaltyPolicy::default().assess(due, now);
        assert_eq!(assessment.map(|a| a.days_overdue), Some(1));
    }

    #[test]
    fn due_date_adds_loan_period() {
        let policy = BorrowPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.due_date(now) - now, Duration::minutes(105));
    }

    proptest! {
        #[test]
        fn amount_is_days_times_rate(minutes in 1i64..100_000) {
            let now = Utc::now();
            let policy = PenaltyPolicy::default();
            let a = policy.assess(now - Duration::minutes(minutes), now).unwrap_or(PenaltyAssessment { days_overdue: -1, amount: -1 });
            prop_assert_eq!(a.days_overdue, minutes / 15);
            prop_assert_eq!(a.amount, a.days_overdue * 10);
        }

        #[test]
        fn assessment_is_monotonic(earlier in 1i64..50_000, extra in 0i64..50_000) {
            let due = Utc::now();
            let policy = PenaltyPolicy::default();
            let first = policy.assess(due, due + Duration::minutes(earlier));
            let second = policy.assess(due, due + Duration::minutes(earlier + extra));
            prop_assert!(first.map(|a| a.amount) <= second.map(|a| a.amount));
        }
    }
}
