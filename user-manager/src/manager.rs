//! User account operations.
//!
//! [`UserManager`] owns the transaction boundaries: each operation acquires one worker, runs
//! its statements through [`Users`], and commits only if everything succeeded. Writes and
//! login go to the `users` primary; search goes to the read-only replica.

use crate::auth::password::{self, PasswordError};
use crate::cache::{self, ExistenceCache};
use crate::db::{
    errors::DbError,
    handlers::Users,
    manager::DbManagerFactory,
    models::users::{UserCreateDBRequest, UserDBResponse, UserFilter, UserStatus, UserUpdateDBRequest},
    worker::DbWorker,
};
use crate::types::{ConnectionRole, USERS_DB, UserId};
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User already taken")]
    AlreadyTaken,

    #[error("User doesn't exist")]
    NotFound,

    #[error("Wrong password")]
    WrongPassword,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Translate storage-level outcomes into account-level ones.
fn classify(err: DbError) -> UserError {
    match err {
        DbError::UniqueViolation { .. } => UserError::AlreadyTaken,
        DbError::NotFound => UserError::NotFound,
        other => UserError::Database(other),
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Fields to change on an existing user. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub password: Option<String>,
}

#[derive(Clone)]
pub struct UserManager {
    factory: Arc<DbManagerFactory>,
    cache: Arc<dyn ExistenceCache>,
}

impl UserManager {
    pub fn new(factory: Arc<DbManagerFactory>, cache: Arc<dyn ExistenceCache>) -> Self {
        Self { factory, cache }
    }

    async fn acquire(&self, role: ConnectionRole) -> Result<DbWorker, UserError> {
        Ok(self.factory.make_manager(USERS_DB, role)?.acquire().await?)
    }

    /// Create a user and return its id.
    ///
    /// A cache hit on the email rejects the request without touching the database. Whatever
    /// the insert's outcome, the email is recorded in the cache afterwards.
    #[instrument(skip(self, user), fields(email = %user.email), err)]
    pub async fn insert_user(&self, user: NewUser) -> Result<UserId, UserError> {
        if cache::exists_or_miss(self.cache.as_ref(), &user.email).await {
            debug!("Email found in existence cache");
            return Err(UserError::AlreadyTaken);
        }

        let credential = password::hash_password_blocking(user.password).await?;
        let request = UserCreateDBRequest {
            name: user.name,
            email: user.email,
            credential,
        };

        let mut worker = self.acquire(ConnectionRole::Primary).await?;
        let result = Users::new(&mut worker).create(&request).await.map_err(classify);
        let result = worker.finish(result).await;

        cache::spawn_set_existence(self.cache.clone(), request.email);
        result
    }

    /// Apply `changes` under a row lock and return the user as stored afterwards.
    #[instrument(skip(self, changes), err)]
    pub async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<UserDBResponse, UserError> {
        let credential = match changes.password {
            Some(password) => Some(password::hash_password_blocking(password).await?),
            None => None,
        };
        let request = UserUpdateDBRequest {
            name: changes.name,
            email: changes.email,
            status: changes.status,
            credential,
            last_login: None,
        };

        let mut worker = self.acquire(ConnectionRole::Primary).await?;
        let result: Result<UserDBResponse, UserError> = async {
            let mut users = Users::new(&mut worker);
            users.update(id, &request).await.map_err(classify)?;
            users.get_by_id(id).await?.ok_or(UserError::NotFound)
        }
        .await;
        worker.finish(result).await
    }

    /// Soft delete: the user is kept with status `DISABLED`.
    #[instrument(skip(self), err)]
    pub async fn delete_user(&self, id: UserId) -> Result<(), UserError> {
        let mut worker = self.acquire(ConnectionRole::Primary).await?;
        let result = Users::new(&mut worker).delete(id).await.map_err(classify);
        worker.finish(result).await
    }

    /// Return one page of matching users and the total number of matches.
    ///
    /// A page past the end is empty while the total still counts every match.
    #[instrument(skip(self, filter), err)]
    pub async fn search_users(&self, filter: &UserFilter) -> Result<(Vec<UserDBResponse>, i64), UserError> {
        let mut worker = self.acquire(ConnectionRole::ReadOnly).await?;
        let result: Result<(Vec<UserDBResponse>, i64), UserError> = async {
            let mut users = Users::new(&mut worker);
            let total = users.count(filter).await?;
            if total == 0 {
                return Ok((Vec::new(), 0));
            }
            let page = users.search(filter).await?;
            Ok((page, total))
        }
        .await;
        worker.finish(result).await
    }

    /// Check credentials of an active user and record the login time.
    ///
    /// Runs on the primary so a password change is visible immediately.
    #[instrument(skip(self, email, password), err)]
    pub async fn login_user(&self, email: &str, password: &str) -> Result<UserDBResponse, UserError> {
        let mut worker = self.acquire(ConnectionRole::Primary).await?;
        let result: Result<UserDBResponse, UserError> = async {
            let mut users = Users::new(&mut worker);
            let stored = users
                .search_with_secrets(&UserFilter::new().with_email(email).with_status(UserStatus::Active))
                .await?
                .into_iter()
                .next()
                .ok_or(UserError::NotFound)?;

            let matches = password::verify_password_blocking(password.to_string(), stored.credential()).await?;
            if !matches {
                debug!(user_id = stored.user.id, "Password mismatch");
                return Err(UserError::WrongPassword);
            }

            let id = stored.user.id;
            users
                .update(id, &UserUpdateDBRequest::login_at(Utc::now().trunc_subsecs(0)))
                .await
                .map_err(classify)?;
            users.get_by_id(id).await?.ok_or(UserError::NotFound)
        }
        .await;
        worker.finish(result).await
    }
}
