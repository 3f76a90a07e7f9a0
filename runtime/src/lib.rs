//! # Libris Runtime
//!
//! Background machinery around the lending core:
//!
//! - [`scheduler`]: the owned penalty accrual task with start/stop lifecycle
//! - [`metrics`]: Prometheus recorder and lending counters
//!
//! ```rust,no_run
//! use libris_runtime::scheduler::PenaltyScheduler;
//! use libris_core::BorrowLifecycle;
//! use std::time::Duration;
//!
//! # async fn example(lifecycle: BorrowLifecycle) {
//! let handle = PenaltyScheduler::new(lifecycle)
//!     .with_period(Duration::from_secs(60))
//!     .start();
//!
//! // ... serve traffic ...
//!
//! handle.stop().await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod metrics;
pub mod scheduler;

pub use scheduler::{DEFAULT_ACCRUAL_PERIOD, PenaltyScheduler, SchedulerHandle};
