//! Axum integration for Libris.
//!
//! The HTTP shell around the lending core:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, bearer tokens
//! │  - Request parsing                      │  ← Correlation ids, tracing
//! │  - Response serialization               │  ← Error mapping
//! ├─────────────────────────────────────────┤
//! │         Lending core                    │
//! │  - BorrowLifecycle                      │  ← Atomic store operations
//! │  - Pure eligibility and penalty rules   │  ← Testable without I/O
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives; the correlation-id layer opens a span
//! 2. **Extract** the bearer token, path and body
//! 3. **Call** the lifecycle or a read-side store query
//! 4. **Map** `LibraryError` to a status code through [`AppError`]

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;

pub use error::{AppError, non_empty};
pub use extractors::{BearerToken, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
