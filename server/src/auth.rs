//! Authentication extractors.
//!
//! - [`SessionUser`]: a valid, unexpired session and the identity behind it
//! - [`RequireAdmin`]: a [`SessionUser`] whose role is admin
//!
//! ```rust,ignore
//! async fn approve(admin: RequireAdmin, ...) -> Result<Json<Loan>, AppError> {
//!     // admin.0.user.role == Role::Admin
//! }
//! ```

use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use libris_core::error::{Entity, LibraryError};
use libris_core::types::{ProfileId, Role, Session, UserAccount, UserId};
use libris_web::{AppError, BearerToken};

/// Authenticated session user.
///
/// Rejections:
/// - 401 for a missing, malformed, unknown or expired token
/// - 404 if the session's identity no longer exists
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// The identity record
    pub user: UserAccount,
    /// The session the token resolved to
    pub session: Session,
}

impl SessionUser {
    /// True for librarian accounts.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }

    /// Allow access to `user_id`'s data: the user themself or an admin.
    ///
    /// # Errors
    ///
    /// 403 for anyone else.
    pub fn ensure_self_or_admin(&self, user_id: UserId) -> Result<(), AppError> {
        if self.is_admin() || self.user.id == user_id {
            Ok(())
        } else {
            Err(AppError::forbidden("You may only access your own records"))
        }
    }

    /// Whether a record borrowed by `borrower` is visible to this caller.
    #[must_use]
    pub fn can_see(&self, borrower: ProfileId) -> bool {
        self.is_admin() || self.user.profile_id == Some(borrower)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;

        let now = state.lifecycle.clock().now();
        let session = state
            .store()
            .resolve_session(token, now)
            .await
            .map_err(|e| match e {
                LibraryError::NotFound(Entity::Session) => {
                    AppError::unauthorized("Session expired or invalid")
                }
                other => other.into(),
            })?;

        let user = state.store().resolve_user_by_id(session.user_id).await?;

        tracing::debug!(user_code = %user.user_code, role = user.role.as_str(), "Session validated");

        Ok(Self { user, session })
    }
}

/// Require admin role.
///
/// Returns 403 Forbidden if the authenticated user is a student.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_user = SessionUser::from_request_parts(parts, state).await?;

        if !session_user.is_admin() {
            tracing::warn!(
                user_code = %session_user.user.user_code,
                "Admin route refused to non-admin"
            );
            return Err(AppError::forbidden("Admin access required"));
        }

        Ok(Self(session_user))
    }
}
