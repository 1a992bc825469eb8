//! Conversation history handler

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use crate::config::AppState;
use crate::models::Message;

use super::auth::ErrorResponse;

/// GET /history/{peer}
///
/// All messages between the caller and `peer`, in either direction,
/// ascending by ingestion time.
pub async fn get_history(
    Path(peer): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, (StatusCode, Json<ErrorResponse>)> {
    let me = super::authorize(&state, &headers).await?;
    info!("GET /history/{} - {}", peer, me.login);

    Ok(Json(state.relay.history(&me.login, &peer)))
}
