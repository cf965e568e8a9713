use super::{CacheError, ExistenceCache, USER_EXISTENCE_HASH};
use crate::config::RedisConfig;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Existence cache backed by a Redis hash with one field per email.
///
/// Holds `pool_min_size` multiplexed connections, used round-robin, and allows at most
/// `pool_max_size` commands in flight.
pub struct RedisExistenceCache {
    connections: Vec<ConnectionManager>,
    next: AtomicUsize,
    in_flight: Semaphore,
    hashset: String,
}

impl RedisExistenceCache {
    #[instrument(skip(config), fields(host = %config.host, port = config.port, db = config.db), err)]
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url())?;
        let size = config.pool_min_size.max(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            connections.push(ConnectionManager::new(client.clone()).await?);
        }
        info!(connections = size, "Connected to Redis");

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            in_flight: Semaphore::new(config.pool_max_size.max(1)),
            hashset: USER_EXISTENCE_HASH.to_string(),
        })
    }

    fn connection(&self) -> ConnectionManager {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].clone()
    }
}

#[async_trait]
impl ExistenceCache for RedisExistenceCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let _permit = self.in_flight.acquire().await.map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let mut conn = self.connection();
        let exists: bool = redis::cmd("HEXISTS").arg(&self.hashset).arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn set_existence(&self, key: &str) -> Result<(), CacheError> {
        let _permit = self.in_flight.acquire().await.map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let mut conn = self.connection();
        let _: i64 = redis::cmd("HSET").arg(&self.hashset).arg(key).arg(0).query_async(&mut conn).await?;
        Ok(())
    }
}
