//! `PostgreSQL` persistence for Libris.
//!
//! This crate provides [`PostgresLibraryStore`], the production implementation
//! of the `LibraryStore` trait from `libris-core`. It uses sqlx with runtime
//! queries and supports:
//!
//! - Transactional borrow, approve, reject and return with row locks
//! - Idempotent penalty upserts with a same-transaction user cache refresh
//! - Catalog search, filtering and autocomplete
//! - Embedded migrations
//!
//! # Example
//!
//! ```no_run
//! use libris_postgres::{PoolSettings, PostgresLibraryStore};
//!
//! # async fn example() -> libris_core::Result<()> {
//! let store =
//!     PostgresLibraryStore::connect("postgres://localhost/libris", &PoolSettings::default())
//!         .await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::{PoolSettings, PostgresLibraryStore};
