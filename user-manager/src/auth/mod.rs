//! Credential handling.
//!
//! Passwords are hashed with Argon2id before they reach the database and are only ever
//! compared through [`password::verify_password`].

pub mod password;
