//! Database repository for users.
//!
//! Statement construction is kept separate from execution so the generated SQL can be
//! checked without a database.

use crate::db::{
    errors::{DbError, Result},
    models::users::{
        DateRange, Page, SortColumn, SortKey, SortOrder, UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest,
        UserWithSecrets,
    },
    statement::Statement,
    worker::DbWorker,
};
use crate::types::UserId;
use tracing::instrument;

const PUBLIC_COLUMNS: &str = "id, name, email, status, last_login, created_at, last_modified";
const SECRET_COLUMNS: &str = "password_hash, salt";

/// Which columns a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Public,
    WithSecrets,
}

pub struct Users<'w> {
    worker: &'w mut DbWorker,
}

impl<'w> Users<'w> {
    pub fn new(worker: &'w mut DbWorker) -> Self {
        Self { worker }
    }

    /// Insert a user and return its id. A taken email surfaces as [`DbError::UniqueViolation`].
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserId> {
        self.worker.insert(insert_statement(request)).await
    }

    /// Lock the row and apply `request`. Errors with [`DbError::NotFound`] if the user is missing.
    #[instrument(skip(self, request), err)]
    pub async fn update(&mut self, id: UserId, request: &UserUpdateDBRequest) -> Result<()> {
        let statement = update_statement(id, request)?;
        if !self.lock(id).await? {
            return Err(DbError::NotFound);
        }
        self.worker.execute(statement).await?;
        Ok(())
    }

    /// Soft delete: the row is kept with status `DISABLED`.
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: UserId) -> Result<()> {
        self.update(id, &UserUpdateDBRequest::disable()).await
    }

    /// Take a row lock held until the worker's transaction ends. Returns whether the row exists.
    async fn lock(&mut self, id: UserId) -> Result<bool> {
        let row: Option<(UserId,)> = self.worker.fetch_one(lock_statement(id)).await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let users = self.search(&UserFilter::new().with_ids(vec![id])).await?;
        Ok(users.into_iter().next())
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        self.worker.fetch_scalar(count_statement(filter)?).await
    }

    #[instrument(skip(self, filter), err)]
    pub async fn search(&mut self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        self.worker.fetch_all(search_statement(filter, Projection::Public)?).await
    }

    /// Search including password material. Only credential checks should call this.
    #[instrument(skip(self, filter), err)]
    pub(crate) async fn search_with_secrets(&mut self, filter: &UserFilter) -> Result<Vec<UserWithSecrets>> {
        self.worker.fetch_all(search_statement(filter, Projection::WithSecrets)?).await
    }
}

pub fn insert_statement(request: &UserCreateDBRequest) -> Statement {
    let mut statement = Statement::new("INSERT INTO users (name, email, password_hash, salt) VALUES (");
    statement
        .separated(", ")
        .push_bind("name", request.name.as_str())
        .push_bind("email", request.email.as_str())
        .push_bind("password_hash", request.credential.password_hash.as_str())
        .push_bind("salt", request.credential.salt.as_str());
    statement.push(") RETURNING id");
    statement
}

pub fn lock_statement(id: UserId) -> Statement {
    let mut statement = Statement::new("SELECT id FROM users WHERE id = ");
    statement.push_bind("id", id).push(" FOR UPDATE");
    statement
}

pub fn update_statement(id: UserId, request: &UserUpdateDBRequest) -> Result<Statement> {
    if request.is_empty() {
        return Err(DbError::invalid_query("update must change at least one field"));
    }

    let mut statement = Statement::new("UPDATE users SET ");
    let mut assignments = statement.separated(", ");
    if let Some(name) = &request.name {
        assignments.push("name = ").push_bind_unseparated("name", name.as_str());
    }
    if let Some(email) = &request.email {
        assignments.push("email = ").push_bind_unseparated("email", email.as_str());
    }
    if let Some(status) = &request.status {
        assignments.push("status = ").push_bind_unseparated("status", status.as_str());
    }
    if let Some(credential) = &request.credential {
        assignments
            .push("password_hash = ")
            .push_bind_unseparated("password_hash", credential.password_hash.as_str());
        assignments.push("salt = ").push_bind_unseparated("salt", credential.salt.as_str());
    }
    if let Some(last_login) = request.last_login {
        assignments.push("last_login = ").push_bind_unseparated("last_login", last_login);
    }
    assignments.push("last_modified = NOW()");

    statement.push(" WHERE id = ").push_bind("id", id);
    Ok(statement)
}

pub fn count_statement(filter: &UserFilter) -> Result<Statement> {
    filter.validate()?;
    let mut statement = Statement::new("SELECT COUNT(id) FROM users");
    push_where(&mut statement, filter);
    Ok(statement)
}

pub fn search_statement(filter: &UserFilter, projection: Projection) -> Result<Statement> {
    filter.validate()?;
    let mut statement = Statement::new("SELECT ");
    statement.push(PUBLIC_COLUMNS);
    if projection == Projection::WithSecrets {
        statement.push(", ").push(SECRET_COLUMNS);
    }
    statement.push(" FROM users");
    push_where(&mut statement, filter);
    push_order_by(&mut statement, &filter.sort_by);
    if let Some(page) = &filter.page {
        push_page(&mut statement, page);
    }
    Ok(statement)
}

/// Escape `LIKE` metacharacters so user input only ever matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_where(statement: &mut Statement, filter: &UserFilter) {
    if !filter.has_filter() {
        return;
    }

    statement.push(" WHERE ");
    let mut conditions = statement.separated(" AND ");

    if let Some(ids) = &filter.user_ids {
        conditions
            .push("id = ANY(")
            .push_bind_unseparated("user_ids", ids.clone())
            .push_unseparated(")");
    }
    if let Some(name) = &filter.name {
        conditions
            .push("name LIKE ")
            .push_bind_unseparated("name", format!("%{}%", escape_like(name)));
    }
    if let Some(email) = &filter.email {
        conditions.push("email = ").push_bind_unseparated("email", email.as_str());
    }
    if let Some(status) = &filter.status {
        conditions.push("status = ").push_bind_unseparated("status", status.as_str());
    }

    let ranges = [
        ("created", "created_at", &filter.created),
        ("updated", "last_modified", &filter.updated),
        ("logged_in", "last_login", &filter.logged_in),
    ];
    for (prefix, column, range) in ranges {
        let Some(DateRange { from, to }) = range else {
            continue;
        };
        if let Some(from) = from {
            conditions
                .push(format_args!("{column} >= "))
                .push_bind_unseparated(format!("{prefix}_from"), *from);
        }
        if let Some(to) = to {
            conditions
                .push(format_args!("{column} <= "))
                .push_bind_unseparated(format!("{prefix}_to"), *to);
        }
    }
}

/// Requested keys first, then `id DESC` so ties never come back in arbitrary order.
fn push_order_by(statement: &mut Statement, sort_by: &[SortKey]) {
    statement.push(" ORDER BY ");
    let mut keys = statement.separated(", ");
    for key in sort_by {
        keys.push(format_args!("{} {}", key.column.column(), key.order.as_sql()));
    }
    if !sort_by.iter().any(|key| key.column == SortColumn::Id) {
        keys.push(format_args!("{} {}", SortColumn::Id.column(), SortOrder::Desc.as_sql()));
    }
}

fn push_page(statement: &mut Statement, page: &Page) {
    statement
        .push(" LIMIT ")
        .push_bind("limit", i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind("offset", page.offset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::users::{Credential, UserStatus};
    use crate::db::statement::SqlParam;
    use crate::test_utils::{create_test_user, manager_for_pool};
    use crate::types::ConnectionRole;
    use chrono::{Duration, TimeZone, Utc};
    use sqlx::PgPool;

    fn credential() -> Credential {
        Credential {
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
        }
    }

    #[test]
    fn test_search_requires_a_filter() {
        let err = search_statement(&UserFilter::new().paginate(10, 0).unwrap(), Projection::Public).unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery { .. }));
        assert!(count_statement(&UserFilter::new()).is_err());
    }

    #[test]
    fn test_default_order_is_id_desc() {
        let statement = search_statement(&UserFilter::new().with_email("a@example.com"), Projection::Public).unwrap();
        assert_eq!(
            statement.sql(),
            "SELECT id, name, email, status, last_login, created_at, last_modified FROM users WHERE email = $1 ORDER BY id DESC"
        );
    }

    #[test]
    fn test_explicit_sort_gets_id_tiebreak() {
        let filter = UserFilter::new()
            .with_status(UserStatus::Active)
            .sorted_by(SortColumn::Name, SortOrder::Asc)
            .sorted_by(SortColumn::CreatedAt, SortOrder::Desc);
        let statement = search_statement(&filter, Projection::Public).unwrap();
        assert!(statement.sql().ends_with("ORDER BY name ASC, created_at DESC, id DESC"));

        let filter = UserFilter::new()
            .with_status(UserStatus::Active)
            .sorted_by(SortColumn::Id, SortOrder::Asc);
        let statement = search_statement(&filter, Projection::Public).unwrap();
        assert!(statement.sql().ends_with("ORDER BY id ASC"));
    }

    #[test]
    fn test_all_filters_are_bound() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = from + Duration::days(30);
        let filter = UserFilter::new()
            .with_ids(vec![1, 2])
            .with_name("ann")
            .with_email("ann@example.com")
            .with_status(UserStatus::Disabled)
            .created_between(Some(from), Some(to))
            .updated_between(Some(from), None)
            .logged_in_between(None, Some(to))
            .paginate(20, 2)
            .unwrap();
        let statement = search_statement(&filter, Projection::Public).unwrap();

        assert_eq!(
            statement.sql(),
            "SELECT id, name, email, status, last_login, created_at, last_modified FROM users \
             WHERE id = ANY($1) AND name LIKE $2 AND email = $3 AND status = $4 \
             AND created_at >= $5 AND created_at <= $6 AND last_modified >= $7 AND last_login <= $8 \
             ORDER BY id DESC LIMIT $9 OFFSET $10"
        );
        assert_eq!(statement.param("user_ids"), Some(&SqlParam::IntList(vec![1, 2])));
        assert_eq!(statement.param("name"), Some(&SqlParam::Text("%ann%".to_string())));
        assert_eq!(statement.param("status"), Some(&SqlParam::Text("DISABLED".to_string())));
        assert_eq!(statement.param("created_from"), Some(&SqlParam::Timestamp(from)));
        assert_eq!(statement.param("logged_in_to"), Some(&SqlParam::Timestamp(to)));
        assert_eq!(statement.param("limit"), Some(&SqlParam::Int(20)));
        assert_eq!(statement.param("offset"), Some(&SqlParam::Int(40)));
    }

    #[test]
    fn test_count_ignores_sort_and_page() {
        let filter = UserFilter::new()
            .with_name("bob")
            .sorted_by(SortColumn::Email, SortOrder::Asc)
            .paginate(5, 1)
            .unwrap();
        let statement = count_statement(&filter).unwrap();
        assert_eq!(statement.sql(), "SELECT COUNT(id) FROM users WHERE name LIKE $1");
    }

    #[test]
    fn test_like_metacharacters_are_escaped() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
        let statement = search_statement(&UserFilter::new().with_name("a%"), Projection::Public).unwrap();
        assert_eq!(statement.param("name"), Some(&SqlParam::Text(r"%a\%%".to_string())));
    }

    #[test]
    fn test_secret_projection() {
        let statement = search_statement(&UserFilter::new().with_email("a@example.com"), Projection::WithSecrets).unwrap();
        assert!(statement.sql().starts_with("SELECT id, name, email, status, last_login, created_at, last_modified, password_hash, salt FROM users"));
    }

    #[test]
    fn test_update_statement() {
        let request = UserUpdateDBRequest {
            name: Some("New".to_string()),
            credential: Some(credential()),
            ..Default::default()
        };
        let statement = update_statement(9, &request).unwrap();
        assert_eq!(
            statement.sql(),
            "UPDATE users SET name = $1, password_hash = $2, salt = $3, last_modified = NOW() WHERE id = $4"
        );
        assert_eq!(statement.param("id"), Some(&SqlParam::Int(9)));

        assert!(update_statement(9, &UserUpdateDBRequest::default()).is_err());
    }

    #[test]
    fn test_insert_statement() {
        let statement = insert_statement(&UserCreateDBRequest {
            name: "Ann".to_string(),
            email: "ann@example.com".to_string(),
            credential: credential(),
        });
        assert_eq!(
            statement.sql(),
            "INSERT INTO users (name, email, password_hash, salt) VALUES ($1, $2, $3, $4) RETURNING id"
        );
        assert_eq!(
            statement.param_names().collect::<Vec<_>>(),
            vec!["name", "email", "password_hash", "salt"]
        );
    }

    #[test]
    fn test_status_only_update_statement() {
        let statement = update_statement(4, &UserUpdateDBRequest::disable()).unwrap();
        assert_eq!(
            statement.sql(),
            "UPDATE users SET status = $1, last_modified = NOW() WHERE id = $2"
        );
        assert_eq!(statement.param("status"), Some(&SqlParam::Text("DISABLED".to_string())));
        assert!(statement.param("password_hash").is_none());
    }

    #[test]
    fn test_lock_statement() {
        assert_eq!(lock_statement(3).sql(), "SELECT id FROM users WHERE id = $1 FOR UPDATE");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_user(pool: PgPool) {
        let manager = manager_for_pool(pool, ConnectionRole::Primary);
        let mut worker = manager.acquire().await.unwrap();
        let mut users = Users::new(&mut worker);

        let id = users
            .create(&UserCreateDBRequest {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                credential: credential(),
            })
            .await
            .unwrap();

        let user = users.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.status, UserStatus::Active);
        assert!(user.last_login.is_none());
        worker.commit().await.unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_email_is_unique_violation(pool: PgPool) {
        create_test_user(&pool, "Alice", "dup@example.com").await;

        let manager = manager_for_pool(pool, ConnectionRole::Primary);
        let mut worker = manager.acquire().await.unwrap();
        let err = Users::new(&mut worker)
            .create(&UserCreateDBRequest {
                name: "Other".to_string(),
                email: "dup@example.com".to_string(),
                credential: credential(),
            })
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_missing_user_is_not_found(pool: PgPool) {
        let manager = manager_for_pool(pool, ConnectionRole::Primary);
        let mut worker = manager.acquire().await.unwrap();
        let err = Users::new(&mut worker)
            .update(999_999, &UserUpdateDBRequest::disable())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_is_soft(pool: PgPool) {
        let id = create_test_user(&pool, "Bob", "bob@example.com").await;

        let manager = manager_for_pool(pool.clone(), ConnectionRole::Primary);
        let mut worker = manager.acquire().await.unwrap();
        Users::new(&mut worker).delete(id).await.unwrap();
        worker.commit().await.unwrap();

        let status: String = sqlx::query_scalar("SELECT status FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "DISABLED");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_count_and_search_agree(pool: PgPool) {
        for i in 0..5 {
            create_test_user(&pool, &format!("Carol {i}"), &format!("carol{i}@example.com")).await;
        }
        create_test_user(&pool, "Dave", "dave@example.com").await;

        let manager = manager_for_pool(pool, ConnectionRole::ReadOnly);
        let mut worker = manager.acquire().await.unwrap();
        let mut users = Users::new(&mut worker);

        let filter = UserFilter::new()
            .with_name("Carol")
            .sorted_by(SortColumn::Email, SortOrder::Asc)
            .paginate(2, 1)
            .unwrap();
        assert_eq!(users.count(&filter).await.unwrap(), 5);

        let page = users.search(&filter).await.unwrap();
        let emails: Vec<_> = page.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["carol2@example.com", "carol3@example.com"]);

        let beyond = users.search(&filter.clone().paginate(2, 10).unwrap()).await.unwrap();
        assert!(beyond.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_date_range_filter(pool: PgPool) {
        let id = create_test_user(&pool, "Erin", "erin@example.com").await;
        let manager = manager_for_pool(pool, ConnectionRole::ReadOnly);
        let mut worker = manager.acquire().await.unwrap();
        let mut users = Users::new(&mut worker);

        let now = Utc::now();
        let recent = UserFilter::new().created_between(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)));
        let found = users.search(&recent).await.unwrap();
        assert_eq!(found.iter().map(|u| u.id).collect::<Vec<_>>(), vec![id]);

        let future = UserFilter::new().created_between(Some(now + Duration::hours(1)), None);
        assert_eq!(users.count(&future).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_search_with_secrets_returns_credential(pool: PgPool) {
        create_test_user(&pool, "Frank", "frank@example.com").await;
        let manager = manager_for_pool(pool, ConnectionRole::Primary);
        let mut worker = manager.acquire().await.unwrap();
        let found = Users::new(&mut worker)
            .search_with_secrets(&UserFilter::new().with_email("frank@example.com"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.name, "Frank");
        assert!(!found[0].password_hash.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_locks_row_until_commit(pool: PgPool) {
        let id = create_test_user(&pool, "Gina", "gina@example.com").await;
        let manager = manager_for_pool(pool.clone(), ConnectionRole::Primary);

        let mut first = manager.acquire().await.unwrap();
        Users::new(&mut first)
            .update(
                id,
                &UserUpdateDBRequest {
                    name: Some("Gina A".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second_manager = manager.clone();
        let second = tokio::spawn(async move {
            let mut worker = second_manager.acquire().await.unwrap();
            let result = Users::new(&mut worker)
                .update(
                    id,
                    &UserUpdateDBRequest {
                        name: Some("Gina B".to_string()),
                        ..Default::default()
                    },
                )
                .await;
            worker.finish(result).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        assert!(!second.is_finished(), "second update should wait for the row lock");

        first.commit().await.unwrap();
        second.await.unwrap().unwrap();

        let name: String = sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Gina B");
    }
}
