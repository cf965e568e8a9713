//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # Routes
//!
//! | Method   | Path           | Success                 |
//! |----------|----------------|-------------------------|
//! | `POST`   | `/user`        | 201, new user id        |
//! | `PATCH`  | `/user/{id}`   | 200, updated user       |
//! | `DELETE` | `/user/{id}`   | 204                     |
//! | `POST`   | `/user/search` | 200, `{users, pages}`   |
//! | `POST`   | `/user/login`  | 200, logged-in user     |
//! | `GET`    | `/healthz`     | 200, engine states      |
//!
//! Every error response has the body `{"error": "<message>"}`.

pub mod handlers;
pub mod models;

use crate::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/user", post(handlers::users::create_user))
        .route(
            "/user/{id}",
            patch(handlers::users::update_user).delete(handlers::users::delete_user),
        )
        .route("/user/search", post(handlers::users::search_users))
        .route("/user/login", post(handlers::users::login_user))
        .route("/healthz", get(handlers::health::healthz))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
