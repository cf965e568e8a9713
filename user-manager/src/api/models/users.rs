//! API request/response models for users.
//!
//! Requests are deserialized with unknown fields rejected, then checked by `validate` /
//! `into_*` before anything reaches the domain layer. Validation failures become 400s with
//! a message naming the offending field.

use crate::db::models::users::{MAX_SEARCH_LIMIT, SortColumn, SortOrder, UserDBResponse, UserFilter, UserStatus};
use crate::errors::{Error, Result};
use crate::manager::{NewUser, UserChanges};
use crate::types::UserId;
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

pub const MAX_FIELD_LENGTH: usize = 255;
pub const MIN_PASSWORD_LENGTH: usize = 10;
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern is valid"));

fn check_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_FIELD_LENGTH {
        return Err(Error::bad_request(format!("name: length must be between 1 and {MAX_FIELD_LENGTH}")));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<()> {
    if email.chars().count() > MAX_FIELD_LENGTH {
        return Err(Error::bad_request(format!("email: longer than {MAX_FIELD_LENGTH} characters")));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(Error::bad_request("email: not a valid email address"));
    }
    Ok(())
}

/// At least ten characters with an uppercase letter, a lowercase letter and a digit.
fn check_password(password: &str) -> Result<()> {
    let strong = password.chars().count() >= MIN_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit());
    if !strong {
        return Err(Error::bad_request(format!(
            "password: must be at least {MIN_PASSWORD_LENGTH} characters and contain upper and lower case letters and a digit"
        )));
    }
    Ok(())
}

fn check_id(id: UserId) -> Result<()> {
    if id <= 0 {
        return Err(Error::bad_request("id: must be a positive integer"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserCreate {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl UserCreate {
    pub fn into_new_user(self) -> Result<NewUser> {
        check_name(&self.name)?;
        check_email(&self.email)?;
        check_password(&self.password)?;
        Ok(NewUser {
            name: self.name,
            email: self.email,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn into_changes(self, id: UserId) -> Result<UserChanges> {
        check_id(id)?;
        if self.name.is_none() && self.email.is_none() && self.status.is_none() && self.password.is_none() {
            return Err(Error::bad_request("At least one field required"));
        }
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        if let Some(password) = &self.password {
            check_password(password)?;
        }
        Ok(UserChanges {
            name: self.name,
            email: self.email,
            status: self.status,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<()> {
        check_email(&self.email)?;
        if self.password.is_empty() {
            return Err(Error::bad_request("password: required"));
        }
        Ok(())
    }
}

/// Inclusive datetime bounds. Values must carry a UTC offset.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateTimeRange {
    pub datetime_from: Option<DateTime<FixedOffset>>,
    pub datetime_to: Option<DateTime<FixedOffset>>,
}

impl DateTimeRange {
    fn to_utc(self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (
            self.datetime_from.map(|dt| dt.with_timezone(&Utc)),
            self.datetime_to.map(|dt| dt.with_timezone(&Utc)),
        )
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortRequest {
    pub column: SortColumn,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchUsersRequest {
    pub user_ids: Option<Vec<UserId>>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub created: Option<DateTimeRange>,
    pub updated: Option<DateTimeRange>,
    pub logged_in: Option<DateTimeRange>,
    pub sort_by: Option<Vec<SortRequest>>,
    pub limit: Option<u32>,
    pub page: Option<u64>,
}

impl SearchUsersRequest {
    /// Build the database filter and return it with the effective page size.
    pub fn into_filter(self) -> Result<(UserFilter, u32)> {
        let limit = self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(Error::bad_request(format!("limit: must be between 1 and {MAX_SEARCH_LIMIT}")));
        }
        let page = self.page.unwrap_or(0);

        let mut filter = UserFilter::new();
        if let Some(ids) = self.user_ids {
            if ids.is_empty() {
                return Err(Error::bad_request("user_ids: at least one id required"));
            }
            ids.iter().try_for_each(|id| check_id(*id))?;
            filter = filter.with_ids(ids);
        }
        if let Some(name) = self.name {
            check_name(&name)?;
            filter = filter.with_name(name);
        }
        if let Some(email) = self.email {
            check_email(&email)?;
            filter = filter.with_email(email);
        }
        if let Some(status) = self.status {
            filter = filter.with_status(status);
        }
        if let Some((from, to)) = self.created.map(DateTimeRange::to_utc) {
            filter = filter.created_between(from, to);
        }
        if let Some((from, to)) = self.updated.map(DateTimeRange::to_utc) {
            filter = filter.updated_between(from, to);
        }
        if let Some((from, to)) = self.logged_in.map(DateTimeRange::to_utc) {
            filter = filter.logged_in_between(from, to);
        }

        if !filter.has_filter() {
            return Err(Error::bad_request("At least one filter required"));
        }

        let mut seen = HashSet::new();
        for sort in self.sort_by.unwrap_or_default() {
            if !seen.insert(sort.column) {
                return Err(Error::bad_request("Duplicated columns for sorting"));
            }
            filter = filter.sorted_by(sort.column, sort.order);
        }

        let filter = filter
            .paginate(limit, page)
            .map_err(|_| Error::bad_request("page: out of range"))?;
        filter.validate()?;
        Ok((filter, limit))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub status: UserStatus,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            status: user.status,
            last_login: user.last_login,
            created_at: user.created_at,
            last_modified: user.last_modified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchUsersResponse {
    pub users: Vec<UserResponse>,
    pub pages: i64,
}

impl SearchUsersResponse {
    pub fn new(users: Vec<UserDBResponse>, total: i64, limit: u32) -> Self {
        let limit = i64::from(limit);
        Self {
            users: users.into_iter().map(UserResponse::from).collect(),
            pages: (total + limit - 1) / limit,
        }
    }
}
