//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`BearerToken`]: the session token from `Authorization: Bearer <token>`

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use libris_core::types::SessionToken;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation-id middleware ran,
/// otherwise from the `X-Correlation-ID` header, otherwise freshly generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Session token extracted from `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing, is not a bearer credential,
/// or does not hold a well-formed token. Validity against the session table
/// is checked by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BearerToken(pub SessionToken);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
        })?;

        let uuid = Uuid::parse_str(token.trim())
            .map_err(|_| AppError::unauthorized("Invalid session token format"))?;

        Ok(Self(SessionToken::from_uuid(uuid)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use axum::http::{Request, StatusCode};

    fn parts_with(header: Option<(&str, String)>) -> Parts {
        let mut builder = Request::builder();
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        let (parts, ()) = builder.body(()).expect("Valid request").into_parts();
        parts
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let mut parts = parts_with(Some(("X-Correlation-ID", uuid.to_string())));

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let mut parts = parts_with(Some(("X-Correlation-ID", Uuid::new_v4().to_string())));
        parts.extensions.insert(CorrelationId(stored));

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, stored);
    }

    #[tokio::test]
    async fn test_bearer_token_parsed() {
        let token = SessionToken::new();
        let mut parts = parts_with(Some(("Authorization", format!("Bearer {token}"))));

        let bearer = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(bearer.0, token);
    }

    #[tokio::test]
    async fn test_bearer_token_rejections() {
        let cases = [
            None,
            Some(("Authorization", "Basic dXNlcjpwYXNz".to_string())),
            Some(("Authorization", "Bearer not-a-token".to_string())),
        ];

        for header in cases {
            let mut parts = parts_with(header);
            let err = BearerToken::from_request_parts(&mut parts, &())
                .await
                .expect_err("Should reject");
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
