//! HTTP request handlers.
//!
//! - [`users`]: account creation, update, soft delete, search and login
//! - [`health`]: liveness and engine state

pub mod health;
pub mod users;
