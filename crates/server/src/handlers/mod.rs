//! HTTP handlers for the Courier server
//!
//! Auth endpoints plus the query surface the chat pages consume. Handlers
//! validate sessions here and hand the relay core a plain identity string;
//! the core never sees tokens.

pub mod auth;
pub mod history;
pub mod users;

// Re-export AppState from config
pub use crate::config::AppState;

// Auth handlers
pub use auth::{login, logout, me, signup};

// Query surface backed by the relay core
pub use history::get_history;
pub use users::list_users;

use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use tracing::warn;

use crate::auth::UserInfo;

use self::auth::ErrorResponse;

/// Resolve the caller from a bearer token.
pub(crate) async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<UserInfo, (StatusCode, Json<ErrorResponse>)> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("Missing bearer token"))?;

    state.auth.validate_session(token).await.map_err(|e| {
        warn!("Rejected session token: {}", e);
        unauthorized("Invalid or expired session")
    })
}

pub(crate) fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
