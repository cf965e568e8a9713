use super::{CacheError, ExistenceCache};
use async_trait::async_trait;
use dashmap::DashSet;

/// Process-local cache, for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct InMemoryExistenceCache {
    keys: DashSet<String>,
}

impl InMemoryExistenceCache {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl ExistenceCache for InMemoryExistenceCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.keys.contains(key))
    }

    async fn set_existence(&self, key: &str) -> Result<(), CacheError> {
        self.keys.insert(key.to_string());
        Ok(())
    }
}

/// Used when no cache is configured: every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExistenceCache;

#[async_trait]
impl ExistenceCache for NoopExistenceCache {
    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn set_existence(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }
}
