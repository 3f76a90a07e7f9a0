//! # Libris Core
//!
//! Domain types and lending rules for the Libris college library backend.
//!
//! The only stateful part of the system is the **borrow lifecycle**: how a
//! copy of a book moves between *available*, *requested*, *borrowed* and
//! *overdue with a penalty*. This crate holds that lifecycle:
//!
//! - [`types`]: entities (books, users, profiles, requests, loans, penalties)
//! - [`error`]: the `NotFound` / `Conflict` / `Validation` / `Storage` taxonomy
//! - [`rules`]: pure eligibility and penalty arithmetic
//! - [`store`]: the [`LibraryStore`](store::LibraryStore) persistence seam
//! - [`lifecycle`]: the [`BorrowLifecycle`](lifecycle::BorrowLifecycle) manager
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────┐
//! │   HTTP handlers      │      │    PenaltyScheduler      │
//! │   (libris-server)    │      │    (libris-runtime)      │
//! └──────────┬───────────┘      └────────────┬─────────────┘
//!            │                               │
//!            ▼                               ▼
//!        ┌─────────────────────────────────────────┐
//!        │            BorrowLifecycle              │  ← rules: pure
//!        └────────────────────┬────────────────────┘
//!                             ▼
//!        ┌─────────────────────────────────────────┐
//!        │        dyn LibraryStore (atomic)        │  ← Postgres / in-memory
//!        └─────────────────────────────────────────┘
//! ```
//!
//! Stores gather a [`BorrowSnapshot`](rules::BorrowSnapshot) inside their own
//! atomic section (a transaction with row locks, or a mutex guard) and ask
//! [`check_eligibility`](rules::check_eligibility) for the verdict before they
//! mutate anything. The check and the mutation therefore never split across
//! two unguarded steps.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod rules;
pub mod store;
pub mod types;

pub use environment::{Clock, SystemClock};
pub use error::{ConflictReason, Entity, LibraryError, Result};
pub use lifecycle::{AccrualReport, BorrowLifecycle};
pub use rules::{BorrowPolicy, BorrowSnapshot, PenaltyAssessment, PenaltyPolicy};
pub use store::{LibraryStore, StoreFuture};
pub use types::*;
