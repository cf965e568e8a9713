//! # user-manager: transactional user management over PostgreSQL
//!
//! `user-manager` is a small HTTP service for user accounts (create, update, soft delete,
//! search, login) built around a reusable data-access layer.
//!
//! ## Architecture
//!
//! The data-access layer lives in [`db`] and is organised in four levels:
//!
//! - **[`db::engine::Engine`]**: one lazily created connection pool per logical database and
//!   role. Creation is retried with a randomized backoff and serialized so concurrent first
//!   use builds a single pool. Pools that hit connection-loss errors are dropped and rebuilt
//!   on next use.
//! - **[`db::manager::DbManagerFactory`]**: a registry handing out one shared
//!   [`db::manager::DbManager`] per `(name, role)` identity.
//! - **[`db::worker::DbWorker`]**: one transaction on one connection. Statements run in order;
//!   the worker commits on success and rolls back otherwise.
//! - **[`db::handlers::Users`]**: the users repository, which turns typed requests and
//!   [`db::models::users::UserFilter`]s into parameterized SQL.
//!
//! On top of that, [`manager::UserManager`] owns the transaction boundaries of each account
//! operation, consults the advisory [`cache`] of known emails, and hashes passwords via
//! [`auth::password`]. The [`api`] module maps it all onto HTTP.
//!
//! Writes and logins use the `users` primary; search uses the `users` read-only replica.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides.
//!
//! ## Testing
//!
//! Database-backed tests use `#[sqlx::test]`, which provisions a fresh database per test with
//! the crate's migrations applied. HTTP tests drive the router through `axum-test`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod manager;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use crate::cache::{ExistenceCache, NoopExistenceCache, RedisExistenceCache};
use crate::db::manager::DbManagerFactory;
use crate::manager::UserManager;
use crate::types::{ConnectionRole, USERS_DB};
use axum::Router;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub use api::build_router;
pub use types::UserId;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .users(UserManager::new(factory.clone(), cache))
///     .factory(factory)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub users: UserManager,
    pub factory: Arc<DbManagerFactory>,
}

/// Get the user-manager database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect the existence cache, falling back to a cache that always misses when Redis is not
/// configured or unreachable.
async fn setup_cache(config: &Config) -> Arc<dyn ExistenceCache> {
    let Some(redis) = &config.redis else {
        info!("No redis configured, existence cache disabled");
        return Arc::new(NoopExistenceCache);
    };

    match RedisExistenceCache::connect(redis).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(error = %e, "Failed to connect to redis, existence cache disabled");
            Arc::new(NoopExistenceCache)
        }
    }
}

/// Application lifecycle:
///
/// 1. **Create**: [`Application::new`] builds the engine registry, connects every engine, runs
///    migrations and connects the cache
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown signal is received, every engine is closed
pub struct Application {
    router: Router,
    config: Config,
    factory: Arc<DbManagerFactory>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let engines = config.database.engine_configs()?;
        for (identity, engine) in &engines {
            debug!(%identity, uri = %types::redact_uri(&engine.uri), pool_size = engine.pool_size, "Configured engine");
        }
        let factory = Arc::new(DbManagerFactory::from_settings(engines, config.engine_retry.clone()));
        factory.init_all().await?;

        if config.run_migrations {
            let pool = factory
                .make_manager(USERS_DB, ConnectionRole::Primary)?
                .engine()
                .ensure_connected()
                .await?;
            migrator().run(&pool).await?;
            info!("Database migrations applied");
        }

        let cache = setup_cache(&config).await;
        let state = AppState::builder()
            .users(UserManager::new(factory.clone(), cache))
            .factory(factory.clone())
            .build();

        Ok(Self {
            router: build_router(state),
            config,
            factory,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("User manager listening on http://{}", bind_addr);

        let served = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await;

        info!("Closing database engines...");
        self.factory.close_all().await;

        served?;
        Ok(())
    }
}
