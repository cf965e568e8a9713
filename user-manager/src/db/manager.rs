//! Registry of per-identity database managers.
//!
//! [`DbManagerFactory`] is constructed once at startup from configuration and shared through
//! application state. Managers are created lazily on first lookup and live for the rest of
//! the process; construction is race-free, so concurrent first lookups get the same instance.

use crate::db::engine::{ConnectionLostPolicy, Engine, EngineConfig, EngineState, PgConnector, PoolConnector, RecreatePolicy, RetryPolicy};
use crate::db::errors::{DbError, Result};
use crate::db::worker::DbWorker;
use crate::types::{ConnectionIdentity, ConnectionRole};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{info, instrument};

/// Owns the engine for one identity and hands out workers on it.
#[derive(Debug)]
pub struct DbManager {
    engine: Arc<Engine>,
}

impl DbManager {
    pub fn new(engine: Engine) -> Self {
        Self { engine: Arc::new(engine) }
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        self.engine.identity()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub async fn init(&self) -> Result<()> {
        self.engine.init().await
    }

    /// Open a transaction on a pooled connection, connecting the engine first if needed.
    pub async fn acquire(&self) -> Result<DbWorker> {
        DbWorker::begin(self.engine.clone()).await
    }

    pub async fn close(&self) {
        self.engine.close().await
    }
}

pub struct DbManagerFactory {
    settings: DashMap<ConnectionIdentity, EngineConfig>,
    managers: DashMap<ConnectionIdentity, Arc<DbManager>>,
    retry: RetryPolicy,
    connector: Arc<dyn PoolConnector>,
    recreate_policy: Arc<dyn RecreatePolicy>,
}

impl std::fmt::Debug for DbManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbManagerFactory")
            .field("identities", &self.identities())
            .field("retry", &self.retry)
            .finish()
    }
}

impl DbManagerFactory {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            settings: DashMap::new(),
            managers: DashMap::new(),
            retry,
            connector: Arc::new(PgConnector),
            recreate_policy: Arc::new(ConnectionLostPolicy),
        }
    }

    pub fn from_settings(settings: impl IntoIterator<Item = (ConnectionIdentity, EngineConfig)>, retry: RetryPolicy) -> Self {
        let factory = Self::new(retry);
        for (identity, config) in settings {
            factory.settings.insert(identity, config);
        }
        factory
    }

    /// Replace how pools are built. Only affects managers created afterwards.
    pub fn with_connector(mut self, connector: Arc<dyn PoolConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_recreate_policy(mut self, policy: Arc<dyn RecreatePolicy>) -> Self {
        self.recreate_policy = policy;
        self
    }

    /// Supply settings for an identity whose manager has not been built yet.
    pub fn configure(&self, identity: ConnectionIdentity, config: EngineConfig) -> Result<()> {
        if self.managers.contains_key(&identity) {
            return Err(DbError::AlreadyConfigured { identity });
        }
        self.settings.insert(identity, config);
        Ok(())
    }

    /// Configured identities, sorted.
    pub fn identities(&self) -> Vec<ConnectionIdentity> {
        let mut identities: Vec<_> = self.settings.iter().map(|entry| entry.key().clone()).collect();
        identities.sort();
        identities
    }

    /// Look up the manager for `(name, role)`, building it on first use.
    pub fn make_manager(&self, name: &str, role: ConnectionRole) -> Result<Arc<DbManager>> {
        let identity = ConnectionIdentity::new(name, role);
        if let Some(manager) = self.managers.get(&identity) {
            return Ok(manager.clone());
        }

        let config = self
            .settings
            .get(&identity)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DbError::ManagerNotFound {
                name: name.to_string(),
                role,
            })?;

        let manager = match self.managers.entry(identity.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let engine = Engine::new(identity, config, self.retry.clone(), self.connector.clone(), self.recreate_policy.clone());
                entry.insert(Arc::new(DbManager::new(engine))).clone()
            }
        };
        Ok(manager)
    }

    /// Eagerly connect every configured identity.
    #[instrument(skip(self), err)]
    pub async fn init_all(&self) -> Result<()> {
        for identity in self.identities() {
            self.make_manager(identity.name(), identity.role())?.init().await?;
        }
        Ok(())
    }

    /// Close every engine built so far.
    pub async fn close_all(&self) {
        let managers: Vec<_> = self.managers.iter().map(|entry| entry.value().clone()).collect();
        for manager in managers {
            manager.close().await;
        }
        info!("Closed {} database engine(s)", self.managers.len());
    }

    /// Engine state per configured identity. Identities never looked up report `Uninitialized`.
    pub fn states(&self) -> Vec<(ConnectionIdentity, EngineState)> {
        self.identities()
            .into_iter()
            .map(|identity| {
                let state = self
                    .managers
                    .get(&identity)
                    .map(|manager| manager.state())
                    .unwrap_or(EngineState::Uninitialized);
                (identity, state)
            })
            .collect()
    }
}
