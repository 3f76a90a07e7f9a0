//! The borrow lifecycle manager.
//!
//! ```text
//!            request_borrow            approve_request
//! available ───────────────▶ requested ───────────────▶ borrowed
//!     ▲     (stock - 1)          │                         │
//!     │                          │ reject_request          │ due date passes
//!     │◀─────────────────────────┘ (stock + 1)             ▼
//!     │                                          overdue (penalty accrues)
//!     │              return_loan (stock + 1)               │
//!     └────────────────────────────────────────────────────┘
//!                                                 penalty frozen
//! ```

use crate::environment::Clock;
use crate::error::{LibraryError, Result};
use crate::rules::{BorrowPolicy, PenaltyPolicy};
use crate::store::LibraryStore;
use crate::types::{
    BookRef, BorrowRequest, Loan, LoanId, LoanView, RequestBorrow, RequestId, ReturnReceipt,
};
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one accrual pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccrualReport {
    /// Overdue loans found
    pub examined: usize,
    /// Penalties created or recomputed
    pub updated: usize,
    /// Loans whose accrual failed (logged, batch continued)
    pub failed: usize,
}

/// Owns the borrow/return/penalty transitions.
///
/// Cheap to clone; share one instance between handlers and the scheduler.
#[derive(Clone)]
pub struct BorrowLifecycle {
    store: Arc<dyn LibraryStore>,
    clock: Arc<dyn Clock>,
    borrow_policy: BorrowPolicy,
    penalty_policy: PenaltyPolicy,
}

impl BorrowLifecycle {
    /// Create a manager with the default policies.
    #[must_use]
    pub fn new(store: Arc<dyn LibraryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            borrow_policy: BorrowPolicy::default(),
            penalty_policy: PenaltyPolicy::default(),
        }
    }

    /// Override the borrow policy.
    #[must_use]
    pub const fn with_borrow_policy(mut self, policy: BorrowPolicy) -> Self {
        self.borrow_policy = policy;
        self
    }

    /// Override the penalty policy.
    #[must_use]
    pub const fn with_penalty_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.penalty_policy = policy;
        self
    }

    /// The underlying store, for read-only display queries.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    /// The injected clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Active borrow policy.
    #[must_use]
    pub const fn borrow_policy(&self) -> &BorrowPolicy {
        &self.borrow_policy
    }

    /// Active penalty policy.
    #[must_use]
    pub const fn penalty_policy(&self) -> &PenaltyPolicy {
        &self.penalty_policy
    }

    /// Create a pending borrow request.
    ///
    /// # Errors
    ///
    /// - `Validation` if a field is blank
    /// - `NotFound(User | Book | Profile)`, checked in that order
    /// - `Conflict(DuplicateRequest | AlreadyBorrowed | OutOfStock | BorrowLimitExceeded)`
    /// - `Storage` on infrastructure failure
    pub async fn request_borrow(&self, request: RequestBorrow) -> Result<BorrowRequest> {
        let blank_title = matches!(&request.book, BookRef::Title(title) if title.is_empty());
        if blank_title || request.user_code.trim().is_empty() || request.email.trim().is_empty() {
            return Err(LibraryError::Validation(
                "All fields are required".to_string(),
            ));
        }

        let now = self.clock.now();
        match self
            .store
            .create_borrow_request(&request, &self.borrow_policy, now)
            .await
        {
            Ok(created) => {
                info!(
                    request_id = %created.id,
                    book_id = %created.book_id,
                    profile_id = %created.profile_id,
                    "Borrow request created"
                );
                Ok(created)
            }
            Err(err) => {
                if err.is_internal() {
                    warn!(user_code = %request.user_code, error = %err, "Borrow request failed");
                } else {
                    debug!(user_code = %request.user_code, error = %err, "Borrow request refused");
                }
                Err(err)
            }
        }
    }

    /// Approve a pending request; the loan is due one loan period from now.
    ///
    /// # Errors
    ///
    /// `NotFound(Request)`, `Conflict(AlreadyDecided)` or `Storage`.
    pub async fn approve_request(&self, request_id: RequestId) -> Result<Loan> {
        let now = self.clock.now();
        let due_date = self.borrow_policy.due_date(now);
        let loan = self.store.approve_request(request_id, due_date, now).await?;
        info!(
            %request_id,
            loan_id = %loan.id,
            due_date = %loan.due_date,
            "Borrow request approved"
        );
        Ok(loan)
    }

    /// Reject a pending request, restoring its copy.
    ///
    /// # Errors
    ///
    /// `NotFound(Request)`, `Conflict(AlreadyDecided)` or `Storage`.
    pub async fn reject_request(&self, request_id: RequestId) -> Result<BorrowRequest> {
        let now = self.clock.now();
        let rejected = self.store.reject_request(request_id, now).await?;
        info!(%request_id, book_id = %rejected.book_id, "Borrow request rejected");
        Ok(rejected)
    }

    /// Return a loan.
    ///
    /// # Errors
    ///
    /// `NotFound(Loan)`, `Conflict(AlreadyReturned)` or `Storage`.
    pub async fn return_loan(&self, loan_id: LoanId) -> Result<ReturnReceipt> {
        let now = self.clock.now();
        let receipt = self.store.return_loan(loan_id, now).await?;
        info!(
            %loan_id,
            available_copies = receipt.available_copies,
            frozen_penalty = receipt.penalty.as_ref().map_or(0, |p| p.amount),
            "Loan returned"
        );
        Ok(receipt)
    }

    /// Recompute penalties of all overdue, unreturned loans.
    ///
    /// Each loan is processed independently: a failure is logged and counted
    /// and the pass moves on. The computation depends only on the clock, so
    /// two passes at the same instant yield identical penalties.
    ///
    /// # Errors
    ///
    /// `Storage` only if the overdue loans cannot be listed at all.
    pub async fn accrue_penalties(&self) -> Result<AccrualReport> {
        let now = self.clock.now();
        let overdue = self.store.overdue_loans(now).await?;
        let mut report = AccrualReport {
            examined: overdue.len(),
            ..AccrualReport::default()
        };

        for loan in &overdue {
            let Some(assessment) = self.penalty_policy.assess(loan.due_date, now) else {
                continue;
            };
            match self.store.upsert_penalty(loan, assessment, now).await {
                Ok(penalty) => {
                    report.updated += 1;
                    debug!(
                        loan_id = %loan.id,
                        profile_id = %penalty.profile_id,
                        days_overdue = penalty.days_overdue,
                        amount = penalty.amount,
                        "Penalty recomputed"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(loan_id = %loan.id, error = %err, "Penalty accrual failed for loan");
                }
            }
        }

        info!(
            examined = report.examined,
            updated = report.updated,
            failed = report.failed,
            "Penalty accrual pass finished"
        );
        Ok(report)
    }

    /// Loans falling due between now and `horizon` from now.
    ///
    /// # Errors
    ///
    /// `Validation` if the window ends past the representable range, `Storage`
    /// on failure.
    pub async fn due_within(&self, horizon: Duration) -> Result<Vec<LoanView>> {
        let now = self.clock.now();
        let until = now
            .checked_add_signed(horizon)
            .ok_or_else(|| LibraryError::Validation("due-soon horizon is out of range".into()))?;
        self.store.loans_due_between(now, until).await
    }
}
