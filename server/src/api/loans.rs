//! Loan endpoints.
//!
//! - POST /api/loans/:id/return - Return a loan
//! - GET /api/loans - Every loan (admin)
//! - GET /api/loans/due?within_minutes= - Loans falling due soon
//! - GET /api/loans/due/tomorrow, /api/loans/due/today - Fixed horizons
//! - GET /api/users/:id/loans - One user's active loans
//! - GET /api/users/:id/history - One user's returned books

use crate::auth::{RequireAdmin, SessionUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Duration;
use libris_core::error::{Entity, LibraryError};
use libris_core::types::{HistoryEntry, LoanId, LoanView, ReturnReceipt, UserId};
use libris_runtime::metrics::LendingMetrics;
use libris_web::{AppError, non_empty};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Loan listing.
#[derive(Debug, Serialize)]
pub struct LoansResponse {
    /// Loans with book and borrower summaries
    pub loans: Vec<LoanView>,
    /// Number of loans
    pub count: usize,
}

impl From<Vec<LoanView>> for LoansResponse {
    fn from(loans: Vec<LoanView>) -> Self {
        Self {
            count: loans.len(),
            loans,
        }
    }
}

/// Book history listing.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Returned books, most recent first
    pub history: Vec<HistoryEntry>,
    /// Number of entries
    pub count: usize,
}

/// `?within_minutes=` of the due-soon endpoint.
#[derive(Debug, Deserialize)]
pub struct DueQuery {
    /// Horizon in minutes; defaults to the "tomorrow" horizon
    pub within_minutes: Option<i64>,
}

/// Return a loan: restock the book, freeze any penalty, write history.
///
/// Students may only return their own active loans; anything else reads as
/// an unknown loan.
pub async fn return_loan(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReturnReceipt>, AppError> {
    let loan_id = LoanId::from_uuid(id);

    if !session.is_admin() {
        let own = state.store().user_loans(session.user.id).await?;
        if !own.iter().any(|view| view.loan.id == loan_id) {
            return Err(LibraryError::NotFound(Entity::Loan).into());
        }
    }

    let receipt = state.lifecycle.return_loan(loan_id).await?;
    LendingMetrics::record_return();
    Ok(Json(receipt))
}

/// Every loan, newest first. 404 when there are none.
pub async fn list_loans(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<LoansResponse>, AppError> {
    let loans = non_empty(state.store().list_loans().await?, "No borrowed books found")?;
    Ok(Json(loans.into()))
}

/// Active loans of one user.
pub async fn user_loans(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoansResponse>, AppError> {
    let user_id = UserId::from_uuid(id);
    session.ensure_self_or_admin(user_id)?;

    let loans = state.store().user_loans(user_id).await?;
    Ok(Json(loans.into()))
}

/// Returned books of one user.
pub async fn user_history(
    session: SessionUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    let user_id = UserId::from_uuid(id);
    session.ensure_self_or_admin(user_id)?;

    let history = state.store().user_history(user_id).await?;
    Ok(Json(HistoryResponse {
        count: history.len(),
        history,
    }))
}

/// Loans due between now and `within_minutes` from now.
pub async fn due_within(
    session: SessionUser,
    State(state): State<AppState>,
    Query(params): Query<DueQuery>,
) -> Result<Json<LoansResponse>, AppError> {
    let minutes = params
        .within_minutes
        .unwrap_or(state.lending.due_tomorrow_minutes);
    if minutes < 0 {
        return Err(AppError::bad_request("within_minutes must not be negative"));
    }
    due_in(&session, &state, minutes).await
}

/// Loans due within the "tomorrow" horizon.
pub async fn due_tomorrow(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<LoansResponse>, AppError> {
    let minutes = state.lending.due_tomorrow_minutes;
    due_in(&session, &state, minutes).await
}

/// Loans due within the "today" horizon.
pub async fn due_today(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<LoansResponse>, AppError> {
    let minutes = state.lending.due_today_minutes;
    due_in(&session, &state, minutes).await
}

async fn due_in(
    session: &SessionUser,
    state: &AppState,
    minutes: i64,
) -> Result<Json<LoansResponse>, AppError> {
    let horizon = Duration::try_minutes(minutes)
        .ok_or_else(|| AppError::bad_request("within_minutes is out of range"))?;
    let loans: Vec<LoanView> = state
        .lifecycle
        .due_within(horizon)
        .await?
        .into_iter()
        .filter(|view| session.can_see(view.loan.profile_id))
        .collect();
    Ok(Json(loans.into()))
}
