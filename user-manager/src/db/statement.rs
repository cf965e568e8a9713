//! Parameterized SQL statements on top of [`sqlx::QueryBuilder`].
//!
//! User-supplied values never reach the SQL text: every value goes through `push_bind`,
//! which hands it to the builder as a positional bind and records it under a name so the
//! bound values can be inspected without a database. Identifiers such as sort columns come
//! from closed enums.
//!
//! A statement is spent once it has been executed.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::fmt;

/// A value bound to a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Int(i64),
    IntList(Vec<i64>),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<Vec<i64>> for SqlParam {
    fn from(value: Vec<i64>) -> Self {
        SqlParam::IntList(value)
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(value: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(value)
    }
}

pub struct Statement {
    builder: QueryBuilder<'static, Postgres>,
    params: Vec<(String, SqlParam)>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            builder: QueryBuilder::new(sql),
            params: Vec::new(),
        }
    }

    /// Append raw SQL. Never pass user input here.
    pub fn push(&mut self, fragment: impl fmt::Display) -> &mut Self {
        self.builder.push(fragment);
        self
    }

    /// Bind `value` as the next positional parameter, recorded under `name`.
    pub fn push_bind(&mut self, name: impl Into<String>, value: impl Into<SqlParam>) -> &mut Self {
        let value = value.into();
        match value.clone() {
            SqlParam::Int(v) => self.builder.push_bind(v),
            SqlParam::IntList(v) => self.builder.push_bind(v),
            SqlParam::Text(v) => self.builder.push_bind(v),
            SqlParam::Timestamp(v) => self.builder.push_bind(v),
        };
        self.params.push((name.into(), value));
        self
    }

    /// Start a list of clauses joined by `separator`, such as `SET` assignments or `WHERE`
    /// conditions.
    pub fn separated(&mut self, separator: &'static str) -> Clauses<'_> {
        Clauses {
            inner: self.builder.separated(separator),
            params: &mut self.params,
        }
    }

    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    pub fn param(&self, name: &str) -> Option<&SqlParam> {
        self.params.iter().find(|(existing, _)| existing == name).map(|(_, value)| value)
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|(name, _)| name.as_str())
    }

    pub(crate) fn build(&mut self) -> Query<'_, Postgres, PgArguments> {
        self.builder.build()
    }

    pub(crate) fn build_query_as<T>(&mut self) -> QueryAs<'_, Postgres, T, PgArguments>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.builder.build_query_as()
    }

    pub(crate) fn build_query_scalar<T>(&mut self) -> QueryScalar<'_, Postgres, T, PgArguments>
    where
        (T,): for<'r> FromRow<'r, PgRow>,
    {
        self.builder.build_query_scalar()
    }
}

/// Bound values are omitted; they may include credentials.
impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("params", &self.param_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Clauses pushed through [`Statement::separated`]. `push` and `push_bind` start a new clause;
/// the `_unseparated` variants continue the current one.
pub struct Clauses<'s> {
    inner: Separated<'s, 'static, Postgres, &'static str>,
    params: &'s mut Vec<(String, SqlParam)>,
}

impl Clauses<'_> {
    pub fn push(&mut self, fragment: impl fmt::Display) -> &mut Self {
        self.inner.push(fragment);
        self
    }

    pub fn push_unseparated(&mut self, fragment: impl fmt::Display) -> &mut Self {
        self.inner.push_unseparated(fragment);
        self
    }

    pub fn push_bind(&mut self, name: impl Into<String>, value: impl Into<SqlParam>) -> &mut Self {
        let value = value.into();
        match value.clone() {
            SqlParam::Int(v) => self.inner.push_bind(v),
            SqlParam::IntList(v) => self.inner.push_bind(v),
            SqlParam::Text(v) => self.inner.push_bind(v),
            SqlParam::Timestamp(v) => self.inner.push_bind(v),
        };
        self.params.push((name.into(), value));
        self
    }

    pub fn push_bind_unseparated(&mut self, name: impl Into<String>, value: impl Into<SqlParam>) -> &mut Self {
        let value = value.into();
        match value.clone() {
            SqlParam::Int(v) => self.inner.push_bind_unseparated(v),
            SqlParam::IntList(v) => self.inner.push_bind_unseparated(v),
            SqlParam::Text(v) => self.inner.push_bind_unseparated(v),
            SqlParam::Timestamp(v) => self.inner.push_bind_unseparated(v),
        };
        self.params.push((name.into(), value));
        self
    }
}
