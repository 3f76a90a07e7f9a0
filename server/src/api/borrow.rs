//! Borrow request endpoints.
//!
//! - POST /api/borrow-requests - Request a book (takes one copy off the shelf)
//! - GET /api/borrow-requests/pending - Requests awaiting a decision (admin)
//! - POST /api/borrow-requests/:id/approve - Open a loan (admin)
//! - POST /api/borrow-requests/:id/reject - Return the copy to the shelf (admin)

use crate::auth::{RequireAdmin, SessionUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use libris_core::error::LibraryError;
use libris_core::types::{
    BookRef, BorrowRequest, Loan, RequestBorrow, RequestId, RequestView,
};
use libris_runtime::metrics::LendingMetrics;
use libris_web::AppError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of a borrow request.
#[derive(Debug, Deserialize)]
pub struct CreateBorrowRequest {
    /// Login code of the borrowing identity
    pub user_id: String,
    /// Title (or catalog id) of the book
    pub book_title: String,
    /// Email of the borrower's profile
    pub email: String,
}

/// Response after creating a borrow request.
#[derive(Debug, Serialize)]
pub struct CreateBorrowResponse {
    /// Always `true`
    pub created: bool,
    /// Created request ID
    pub request_id: RequestId,
    /// Success message
    pub message: String,
}

/// Pending requests.
#[derive(Debug, Serialize)]
pub struct PendingRequestsResponse {
    /// Requests, oldest first
    pub requests: Vec<RequestView>,
    /// Number of requests
    pub count: usize,
}

/// Metrics label for a borrow outcome.
fn outcome_label(result: &Result<BorrowRequest, LibraryError>) -> &'static str {
    match result {
        Ok(_) => "created",
        Err(LibraryError::Conflict(reason)) => reason.code(),
        Err(LibraryError::NotFound(_)) => "not_found",
        Err(LibraryError::Validation(_)) => "invalid",
        Err(LibraryError::Storage(_)) => "error",
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a pending borrow request.
///
/// Students may only borrow for themselves; admins may borrow on behalf of
/// anyone.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/borrow-requests \
///   -H "Authorization: Bearer <session_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"user_id":"S1001","book_title":"Operating Systems","email":"s1001@college.edu"}'
/// ```
pub async fn create_borrow_request(
    session: SessionUser,
    State(state): State<AppState>,
    Json(body): Json<CreateBorrowRequest>,
) -> Result<(StatusCode, Json<CreateBorrowResponse>), AppError> {
    if !session.is_admin() && session.user.user_code != body.user_id.trim() {
        return Err(AppError::forbidden(
            "You may only create borrow requests for yourself",
        ));
    }
    if !session.is_admin() {
        // Unknown emails fall through so the lifecycle reports them in order.
        match state.store().resolve_profile(body.email.trim()).await {
            Ok(profile) if !session.can_see(profile.id) => {
                return Err(AppError::forbidden(
                    "You may only create borrow requests for your own profile",
                ));
            }
            Ok(_) | Err(LibraryError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    let result = state
        .lifecycle
        .request_borrow(RequestBorrow {
            user_code: body.user_id.trim().to_string(),
            book: BookRef::parse(&body.book_title),
            email: body.email.trim().to_string(),
        })
        .await;
    LendingMetrics::record_borrow_request(outcome_label(&result));

    let request = result?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBorrowResponse {
            created: true,
            request_id: request.id,
            message: "Borrow request created".to_string(),
        }),
    ))
}

/// Requests awaiting a decision.
pub async fn pending_requests(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<PendingRequestsResponse>, AppError> {
    let requests = state.store().pending_requests().await?;
    Ok(Json(PendingRequestsResponse {
        count: requests.len(),
        requests,
    }))
}

/// Approve a pending request; the loan is due one loan period from now.
pub async fn approve_request(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Loan>, AppError> {
    let loan = state
        .lifecycle
        .approve_request(RequestId::from_uuid(id))
        .await?;
    LendingMetrics::record_decision("approved");
    Ok(Json(loan))
}

/// Reject a pending request; its copy goes back on the shelf.
pub async fn reject_request(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BorrowRequest>, AppError> {
    let request = state
        .lifecycle
        .reject_request(RequestId::from_uuid(id))
        .await?;
    LendingMetrics::record_decision("rejected");
    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::error::{ConflictReason, Entity};

    #[test]
    fn outcome_labels() {
        assert_eq!(
            outcome_label(&Err(LibraryError::Conflict(ConflictReason::OutOfStock))),
            "out_of_stock"
        );
        assert_eq!(
            outcome_label(&Err(LibraryError::NotFound(Entity::Book))),
            "not_found"
        );
    }
}
