//! GET /api/penalties - Penalties with book and borrower summaries.
//!
//! Admins see every penalty; students see their own.

use crate::auth::SessionUser;
use crate::state::AppState;
use axum::{Json, extract::State};
use libris_core::types::PenaltyView;
use libris_web::AppError;
use serde::Serialize;

/// Penalty listing.
#[derive(Debug, Serialize)]
pub struct PenaltiesResponse {
    /// Penalties
    pub penalties: Vec<PenaltyView>,
    /// Number of penalties
    pub count: usize,
    /// Sum of the listed amounts
    pub total_amount: i64,
}

/// List penalties visible to the caller.
pub async fn list_penalties(
    session: SessionUser,
    State(state): State<AppState>,
) -> Result<Json<PenaltiesResponse>, AppError> {
    let penalties: Vec<PenaltyView> = state
        .store()
        .list_penalties()
        .await?
        .into_iter()
        .filter(|view| session.can_see(view.penalty.profile_id))
        .collect();

    Ok(Json(PenaltiesResponse {
        count: penalties.len(),
        total_amount: penalties.iter().map(|view| view.penalty.amount).sum(),
        penalties,
    }))
}
