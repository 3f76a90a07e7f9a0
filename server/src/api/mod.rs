//! `/api` handlers.

pub mod books;
pub mod borrow;
pub mod loans;
pub mod members;
pub mod penalties;
