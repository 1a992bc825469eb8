//! Contact list handler

use std::collections::HashMap;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{info, warn};

use crate::config::AppState;
use crate::models::UserStatus;

use super::auth::ErrorResponse;

/// GET /users
///
/// Every other registered account, with live presence from the relay.
/// Accounts that never connected this process show as offline.
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserStatus>>, (StatusCode, Json<ErrorResponse>)> {
    let me = super::authorize(&state, &headers).await?;
    info!("GET /users - {}", me.login);

    let live: HashMap<String, bool> = state
        .relay
        .list_other_identities(&me.login)
        .into_iter()
        .map(|status| (status.identity, status.online))
        .collect();

    let users = state.auth.list_users().await.map_err(|e| {
        warn!("Failed to list users: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to list users".to_string(),
            }),
        )
    })?;

    let list = users
        .into_iter()
        .filter(|user| user.login != me.login)
        .map(|user| {
            let online = live.get(&user.login).copied().unwrap_or(false);
            UserStatus {
                identity: user.login,
                online,
            }
        })
        .collect();

    Ok(Json(list))
}
