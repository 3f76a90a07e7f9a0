//! GET /api/members - Identities joined with their profiles (admin).

use crate::auth::RequireAdmin;
use crate::state::AppState;
use axum::{Json, extract::State};
use libris_core::types::Member;
use libris_web::{AppError, non_empty};
use serde::Serialize;

/// Member listing.
#[derive(Debug, Serialize)]
pub struct MembersResponse {
    /// Members, by login code
    pub members: Vec<Member>,
    /// Number of members
    pub count: usize,
}

/// List members. 404 when there are none.
pub async fn list_members(
    _admin: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<MembersResponse>, AppError> {
    let members = non_empty(state.store().list_members().await?, "No members found")?;
    Ok(Json(MembersResponse {
        count: members.len(),
        members,
    }))
}
