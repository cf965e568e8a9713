//! Test utilities for database-backed tests.

use crate::db::engine::{EngineConfig, PoolConnector, RetryPolicy};
use crate::db::manager::{DbManager, DbManagerFactory};
use crate::types::{ConnectionIdentity, ConnectionRole, USERS_DB, UserId};
use crate::{AppState, cache::InMemoryExistenceCache, manager::UserManager};
use async_trait::async_trait;
use axum_test::TestServer;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use std::sync::Arc;
use std::time::Duration;

/// Serves the pool `#[sqlx::test]` creates to primary engines. Read-only engines get a separate
/// pool on the same database whose sessions run with `default_transaction_read_only = on`, so a
/// write routed to the replica fails instead of silently succeeding.
pub struct TestPoolConnector {
    primary: PgPool,
}

impl TestPoolConnector {
    pub fn new(primary: PgPool) -> Self {
        Self { primary }
    }
}

#[async_trait]
impl PoolConnector for TestPoolConnector {
    async fn connect(&self, identity: &ConnectionIdentity, config: &EngineConfig) -> Result<PgPool, sqlx::Error> {
        match identity.role() {
            ConnectionRole::Primary => Ok(self.primary.clone()),
            ConnectionRole::ReadOnly => {
                PgPoolOptions::new()
                    .max_connections(config.pool_size)
                    .after_connect(|conn, _meta| {
                        Box::pin(async move {
                            conn.execute("SET default_transaction_read_only = on").await?;
                            Ok(())
                        })
                    })
                    .connect_with((*self.primary.connect_options()).clone())
                    .await
            }
        }
    }
}

fn test_engine_config() -> EngineConfig {
    EngineConfig {
        uri: "postgres://sqlx-test/users".to_string(),
        pool_size: 5,
        debug: false,
        recycle_interval: Duration::from_secs(3600),
    }
}

/// A factory with `users/primary` backed by `pool` and `users/read_only` backed by a read-only
/// view of the same database.
pub fn factory_for_pool(pool: PgPool) -> DbManagerFactory {
    DbManagerFactory::from_settings(
        [
            (ConnectionIdentity::primary(USERS_DB), test_engine_config()),
            (ConnectionIdentity::read_only(USERS_DB), test_engine_config()),
        ],
        RetryPolicy::default(),
    )
    .with_connector(Arc::new(TestPoolConnector::new(pool)))
}

pub fn manager_for_pool(pool: PgPool, role: ConnectionRole) -> Arc<DbManager> {
    factory_for_pool(pool)
        .make_manager(USERS_DB, role)
        .expect("users manager is configured")
}

/// Insert a user directly, bypassing hashing. The stored credential never verifies.
pub async fn create_test_user(pool: &PgPool, name: &str, email: &str) -> UserId {
    sqlx::query_scalar("INSERT INTO users (name, email, password_hash, salt) VALUES ($1, $2, 'test-hash', 'test-salt') RETURNING id")
        .bind(name)
        .bind(email)
        .fetch_one(pool)
        .await
        .expect("Failed to create test user")
}

pub fn create_test_app(pool: PgPool) -> (TestServer, Arc<InMemoryExistenceCache>) {
    let factory = Arc::new(factory_for_pool(pool));
    let cache = Arc::new(InMemoryExistenceCache::default());
    let state = AppState::builder()
        .users(UserManager::new(factory.clone(), cache.clone()))
        .factory(factory)
        .build();

    let server = TestServer::new(crate::build_router(state)).expect("Failed to create test server");
    (server, cache)
}
