//! Database models for users.

use crate::db::errors::DbError;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest page a search may request.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Account status. Deleting a user only flips it to [`UserStatus::Disabled`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
}

#[derive(Debug, Error)]
#[error("Unknown user status: {0}")]
pub struct UnknownStatus(pub String);

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "DISABLED" => Ok(UserStatus::Disabled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for UserStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Hashed password material as stored alongside the user.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub password_hash: String,
    pub salt: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential { .. }")
    }
}

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    pub email: String,
    pub credential: Credential,
}

/// Database request for updating a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub credential: Option<Credential>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserUpdateDBRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.status.is_none() && self.credential.is_none() && self.last_login.is_none()
    }

    pub fn disable() -> Self {
        Self {
            status: Some(UserStatus::Disabled),
            ..Default::default()
        }
    }

    pub fn login_at(when: DateTime<Utc>) -> Self {
        Self {
            last_login: Some(when),
            ..Default::default()
        }
    }
}

/// Database response for a user. Never carries password material.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// A user together with its password material, for credential checks only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserWithSecrets {
    #[sqlx(flatten)]
    pub user: UserDBResponse,
    pub password_hash: String,
    pub salt: String,
}

impl UserWithSecrets {
    pub fn credential(&self) -> Credential {
        Credential {
            password_hash: self.password_hash.clone(),
            salt: self.salt.clone(),
        }
    }
}

/// Columns a search may order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Id,
    Name,
    Email,
    Status,
    CreatedAt,
    LastModified,
    LastLogin,
}

impl SortColumn {
    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Name => "name",
            SortColumn::Email => "email",
            SortColumn::Status => "status",
            SortColumn::CreatedAt => "created_at",
            SortColumn::LastModified => "last_modified",
            SortColumn::LastLogin => "last_login",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: SortColumn,
    pub order: SortOrder,
}

/// Inclusive bounds on a timestamp column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: i64,
}

impl Page {
    /// The `page`-th page (zero-based) of `limit` rows. Fails when the offset does not fit a
    /// Postgres `BIGINT`.
    pub fn nth(limit: u32, page: u64) -> Result<Self, DbError> {
        u64::from(limit)
            .checked_mul(page)
            .and_then(|offset| i64::try_from(offset).ok())
            .map(|offset| Self { limit, offset })
            .ok_or_else(|| DbError::PageOutOfRange { limit, page })
    }
}

/// Filter for searching users. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub user_ids: Option<Vec<UserId>>,
    /// Case-sensitive substring match
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub created: Option<DateRange>,
    pub updated: Option<DateRange>,
    pub logged_in: Option<DateRange>,
    pub sort_by: Vec<SortKey>,
    pub page: Option<Page>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<UserId>) -> Self {
        self.user_ids = Some(ids);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.created = Some(DateRange { from, to });
        self
    }

    pub fn updated_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.updated = Some(DateRange { from, to });
        self
    }

    pub fn logged_in_between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.logged_in = Some(DateRange { from, to });
        self
    }

    pub fn sorted_by(mut self, column: SortColumn, order: SortOrder) -> Self {
        self.sort_by.push(SortKey { column, order });
        self
    }

    pub fn paginate(mut self, limit: u32, page: u64) -> Result<Self, DbError> {
        self.page = Some(Page::nth(limit, page)?);
        Ok(self)
    }

    /// Whether at least one narrowing criterion is set. Sorting and paging do not count.
    pub fn has_filter(&self) -> bool {
        let has_range = |range: &Option<DateRange>| range.as_ref().is_some_and(|r| !r.is_empty());
        self.user_ids.is_some()
            || self.name.is_some()
            || self.email.is_some()
            || self.status.is_some()
            || has_range(&self.created)
            || has_range(&self.updated)
            || has_range(&self.logged_in)
    }

    /// Reject filters that would scan the whole table or produce ambiguous SQL.
    pub fn validate(&self) -> Result<(), DbError> {
        if !self.has_filter() {
            return Err(DbError::invalid_query("at least one search filter is required"));
        }

        let mut seen = HashSet::new();
        for key in &self.sort_by {
            if !seen.insert(key.column) {
                return Err(DbError::invalid_query(format!("duplicate sort column {}", key.column.column())));
            }
        }

        if self.page.is_some_and(|page| page.limit == 0 || page.limit > MAX_SEARCH_LIMIT) {
            return Err(DbError::invalid_query(format!("limit must be between 1 and {MAX_SEARCH_LIMIT}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!(UserStatus::try_from("DISABLED".to_string()).unwrap(), UserStatus::Disabled);
        assert_eq!(UserStatus::Active.to_string(), "ACTIVE");
        assert!("active".parse::<UserStatus>().is_err());
    }

    #[test]
    fn test_sort_and_page_are_not_filters() {
        let filter = UserFilter::new().sorted_by(SortColumn::Name, SortOrder::Desc).paginate(10, 2).unwrap();
        assert!(!filter.has_filter());
        assert!(matches!(filter.validate(), Err(DbError::InvalidQuery { .. })));
    }

    #[test]
    fn test_empty_date_range_is_not_a_filter() {
        assert!(!UserFilter::new().created_between(None, None).has_filter());
        assert!(UserFilter::new().created_between(Some(Utc::now()), None).has_filter());
    }

    #[test]
    fn test_duplicate_sort_columns_rejected() {
        let filter = UserFilter::new()
            .with_status(UserStatus::Active)
            .sorted_by(SortColumn::Email, SortOrder::Asc)
            .sorted_by(SortColumn::Email, SortOrder::Desc);
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_limit_bounds() {
        let base = UserFilter::new().with_email("a@example.com");
        assert!(base.clone().paginate(MAX_SEARCH_LIMIT, 0).unwrap().validate().is_ok());
        assert!(base.clone().paginate(MAX_SEARCH_LIMIT + 1, 0).unwrap().validate().is_err());
        assert!(base.paginate(0, 0).unwrap().validate().is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::nth(25, 3).unwrap(), Page { limit: 25, offset: 75 });
        assert_eq!(Page::nth(0, u64::MAX).unwrap(), Page { limit: 0, offset: 0 });
    }

    #[test]
    fn test_page_offset_overflow_is_an_error() {
        assert!(matches!(
            Page::nth(10, u64::MAX),
            Err(DbError::PageOutOfRange { limit: 10, page: u64::MAX })
        ));
        // Fits in u64 but not in a BIGINT offset
        assert!(Page::nth(1, u64::MAX / 2 + 1).is_err());
        assert!(Page::nth(1, i64::MAX as u64).is_ok());
        assert!(UserFilter::new().with_name("a").paginate(MAX_SEARCH_LIMIT, u64::MAX).is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential {
            password_hash: "$argon2id$secret".to_string(),
            salt: "pepper".to_string(),
        };
        assert!(!format!("{credential:?}").contains("secret"));
    }
}
