//! Repository implementations for database access.
//!
//! Repositories borrow a [`crate::db::worker::DbWorker`] and run every statement inside its
//! transaction. Committing or rolling back is left to the caller.
//!
//! - [`Users`]: User account management and search

pub mod users;

pub use users::Users;
