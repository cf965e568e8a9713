//! Advisory cache of known user emails.
//!
//! The cache is only a hint in front of the database's unique constraint. A hit short-circuits
//! user creation; a miss (or any cache failure) falls through to the database, which stays the
//! source of truth. Writes happen in detached tasks so the request path never waits on them,
//! and their errors are logged and dropped.

mod memory;
mod redis_cache;

pub use memory::{InMemoryExistenceCache, NoopExistenceCache};
pub use redis_cache::RedisExistenceCache;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Name of the hash holding one field per known email.
pub const USER_EXISTENCE_HASH: &str = "user_existence";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ExistenceCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn set_existence(&self, key: &str) -> Result<(), CacheError>;
}

/// Look `key` up, treating any cache failure as a miss.
pub async fn exists_or_miss(cache: &dyn ExistenceCache, key: &str) -> bool {
    match cache.exists(key).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(error = %e, "Existence cache lookup failed, falling through to database");
            false
        }
    }
}

/// Record `key` in a detached task. The returned handle may be dropped.
pub fn spawn_set_existence(cache: Arc<dyn ExistenceCache>, key: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        match cache.set_existence(&key).await {
            Ok(()) => debug!("Cached user existence"),
            Err(e) => warn!(error = %e, "Failed to cache user existence"),
        }
    })
}
