//! Password hashing and verification.
//!
//! Every password gets its own random salt. The salt is stored in its own column next to the
//! Argon2 PHC string, and verification checks that the two agree before comparing hashes.

use crate::db::models::users::Credential;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to {operation}")]
    Hashing { operation: String },

    #[error("Password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| PasswordError::Hashing {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a password with a freshly generated salt.
pub fn hash_password_with_params(password: &str, params: Option<Argon2Params>) -> Result<Credential, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| PasswordError::Hashing {
        operation: format!("hash password: {e}"),
    })?;

    Ok(Credential {
        password_hash: hash.to_string(),
        salt: salt.as_str().to_string(),
    })
}

pub fn hash_password(password: &str) -> Result<Credential, PasswordError> {
    hash_password_with_params(password, None)
}

/// Check `password` against a stored credential.
///
/// Verification uses the parameters embedded in the hash itself. A hash whose salt does not
/// match the stored salt never verifies.
pub fn verify_password(password: &str, credential: &Credential) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(&credential.password_hash).map_err(|e| PasswordError::Hashing {
        operation: format!("parse hash: {e}"),
    })?;

    if parsed_hash.salt.map(|salt| salt.as_str()) != Some(credential.salt.as_str()) {
        return Ok(false);
    }

    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
}

/// [`hash_password`] on the blocking thread pool.
pub async fn hash_password_blocking(password: String) -> Result<Credential, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

/// [`verify_password`] on the blocking thread pool.
pub async fn verify_password_blocking(password: String, credential: Credential) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &credential)).await?
}
