use crate::AppState;
use crate::api::models::users::{
    LoginRequest, SearchUsersRequest, SearchUsersResponse, UserCreate, UserResponse, UserUpdate,
};
use crate::errors::{Error, Result};
use crate::manager::UserError;
use crate::types::UserId;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use tracing::debug;

/// Decode a JSON body. Bytes that are not JSON at all are a 415; JSON of the wrong shape is a 400.
/// An empty body is treated as `{}` so that missing fields get a field-level message.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { &body[..] };
    serde_json::from_slice(raw).map_err(|e| match e.classify() {
        Category::Data => Error::bad_request(e.to_string()),
        Category::Syntax | Category::Eof | Category::Io => Error::UnsupportedPayload { message: e.to_string() },
    })
}

#[tracing::instrument(skip_all)]
pub async fn create_user(State(state): State<AppState>, body: Bytes) -> Result<(StatusCode, Json<UserId>)> {
    let request: UserCreate = parse_body(&body)?;
    let id = state.users.insert_user(request.into_new_user()?).await?;
    Ok((StatusCode::CREATED, Json(id)))
}

#[tracing::instrument(skip_all, fields(user_id = id))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    body: Bytes,
) -> Result<Json<UserResponse>> {
    let request: UserUpdate = parse_body(&body)?;
    let changes = request.into_changes(id)?;
    match state.users.update_user(id, changes).await {
        Ok(user) => Ok(Json(UserResponse::from(user))),
        Err(UserError::AlreadyTaken) => Err(Error::bad_request("One or more fields exist for another users")),
        Err(UserError::NotFound) => Err(Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[tracing::instrument(skip_all, fields(user_id = id))]
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<StatusCode> {
    if id <= 0 {
        return Err(Error::bad_request("id: must be a positive integer"));
    }
    match state.users.delete_user(id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(UserError::NotFound) => Err(Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[tracing::instrument(skip_all)]
pub async fn search_users(State(state): State<AppState>, body: Bytes) -> Result<Json<SearchUsersResponse>> {
    let request: SearchUsersRequest = parse_body(&body)?;
    let (filter, limit) = request.into_filter()?;
    let (users, total) = state.users.search_users(&filter).await?;
    Ok(Json(SearchUsersResponse::new(users, total, limit)))
}

#[tracing::instrument(skip_all)]
pub async fn login_user(State(state): State<AppState>, body: Bytes) -> Result<Json<UserResponse>> {
    let request: LoginRequest = parse_body(&body)?;
    request.validate()?;
    match state.users.login_user(&request.email, &request.password).await {
        Ok(user) => Ok(Json(UserResponse::from(user))),
        Err(UserError::NotFound) => {
            debug!("Login for unknown or disabled user");
            Err(Error::LoginFailed)
        }
        Err(e) => Err(e.into()),
    }
}
