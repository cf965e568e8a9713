//! A single transaction on one pooled connection.
//!
//! [`DbWorker::finish`] is the normal way to end a unit of work: it commits when the work
//! succeeded and rolls back otherwise, then releases the connection. A worker dropped without
//! finishing (including a cancelled request future) is rolled back when sqlx returns the
//! connection to the pool, so partial writes are never persisted.

use crate::db::engine::Engine;
use crate::db::errors::{DbError, Result};
use crate::db::statement::Statement;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Open,
    Committed,
    RolledBack,
}

pub struct DbWorker {
    engine: Arc<Engine>,
    /// The pool the transaction was opened on
    pool: Arc<PgPool>,
    tx: Option<Transaction<'static, Postgres>>,
    state: WorkerState,
}

impl std::fmt::Debug for DbWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWorker")
            .field("identity", self.engine.identity())
            .field("state", &self.state)
            .finish()
    }
}

impl DbWorker {
    /// Check a connection out of the engine's pool and open a transaction on it.
    pub(crate) async fn begin(engine: Arc<Engine>) -> Result<Self> {
        let pool = engine.acquire_pool().await?;
        let tx = match pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                engine.dispose_if_recoverable(&pool, &e);
                return Err(e.into());
            }
        };
        debug!(identity = %engine.identity(), "Transaction opened");

        Ok(Self {
            engine,
            pool,
            tx: Some(tx),
            state: WorkerState::Open,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn connection(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("Transaction already closed")))
    }

    fn classify(&self, err: sqlx::Error) -> DbError {
        self.engine.dispose_if_recoverable(&self.pool, &err);
        DbError::from(err)
    }

    /// Execute a statement and return the number of affected rows.
    #[instrument(skip_all, fields(sql = statement.sql()), err)]
    pub async fn execute(&mut self, mut statement: Statement) -> Result<u64> {
        let conn = self.connection()?;
        let result = statement.build().execute(conn).await;
        result.map(|done| done.rows_affected()).map_err(|e| self.classify(e))
    }

    /// Execute an `INSERT ... RETURNING id` statement and return the new id.
    #[instrument(skip_all, fields(sql = statement.sql()), err)]
    pub async fn insert(&mut self, statement: Statement) -> Result<i64> {
        self.fetch_scalar(statement).await
    }

    /// Fetch the first row, if any.
    pub async fn fetch_one<T>(&mut self, mut statement: Statement) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let conn = self.connection()?;
        let result = statement.build_query_as::<T>().fetch_optional(conn).await;
        result.map_err(|e| self.classify(e))
    }

    pub async fn fetch_all<T>(&mut self, mut statement: Statement) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let conn = self.connection()?;
        let result = statement.build_query_as::<T>().fetch_all(conn).await;
        result.map_err(|e| self.classify(e))
    }

    /// Fetch the first column of the first row. Errors with [`DbError::NotFound`] on no rows.
    pub async fn fetch_scalar<T>(&mut self, mut statement: Statement) -> Result<T>
    where
        (T,): for<'r> FromRow<'r, PgRow>,
        T: Send + Unpin,
    {
        let conn = self.connection()?;
        let result = statement.build_query_scalar::<T>().fetch_one(conn).await;
        result.map_err(|e| self.classify(e))
    }

    pub async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("Transaction already closed")))?;
        match tx.commit().await {
            Ok(()) => {
                self.state = WorkerState::Committed;
                debug!(identity = %self.engine.identity(), "Transaction committed");
                Ok(())
            }
            Err(e) => {
                // A failed commit leaves nothing persisted
                self.state = WorkerState::RolledBack;
                Err(self.classify(e))
            }
        }
    }

    pub async fn rollback(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("Transaction already closed")))?;
        self.state = WorkerState::RolledBack;
        debug!(identity = %self.engine.identity(), "Rolling back transaction");
        tx.rollback().await.map_err(|e| self.classify(e))
    }

    /// Commit if `result` is `Ok`, roll back otherwise, and hand `result` back.
    ///
    /// A failed commit replaces the success value with the commit error. A failed rollback is
    /// logged and the original error is kept.
    pub async fn finish<T, E>(mut self, result: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<DbError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back transaction");
                }
                Err(err)
            }
        }
    }
}

impl Drop for DbWorker {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(identity = %self.engine.identity(), "Worker dropped with open transaction, rolling back");
        }
    }
}
