//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ DbManagerFactory │  one per process, keyed by (name, role)
//! └────────┬─────────┘
//!          │ make_manager
//!          ↓
//! ┌──────────────────┐
//! │    DbManager     │  owns one Engine (lazily connected pool)
//! └────────┬─────────┘
//!          │ acquire
//!          ↓
//! ┌──────────────────┐
//! │     DbWorker     │  one transaction on one pooled connection
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │  Repositories    │  (db::handlers - statement construction & queries)
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`engine`]: Pool lifecycle with bounded retry and connection-loss recovery
//! - [`manager`]: The per-identity registry and managers
//! - [`worker`]: Transaction-scoped unit of work
//! - [`statement`]: Parameterized SQL with named bindings
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Example Usage
//!
//! ```ignore
//! use user_manager::db::handlers::Users;
//! use user_manager::types::{ConnectionRole, USERS_DB};
//!
//! let mut worker = factory.make_manager(USERS_DB, ConnectionRole::Primary)?.acquire().await?;
//! let result = Users::new(&mut worker).delete(user_id).await;
//! worker.finish(result).await?;
//! ```
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator.

pub mod engine;
pub mod errors;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod statement;
pub mod worker;
