//! # Libris Server
//!
//! HTTP surface of the college library backend: bearer-session auth, the
//! `/api` routes, health and metrics endpoints, and the process lifecycle
//! that runs the penalty scheduler next to the server.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod health;
pub mod routes;
pub mod state;

pub use app::{Application, ApplicationError};
pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
