//! Auth handlers

use crate::auth::UserInfo;
use crate::config::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub login: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("POST /auth/signup - {}", req.login);

    match state
        .auth
        .signup(req.login.clone(), req.password.clone())
        .await
    {
        Ok(user) => {
            // Create session
            match state.auth.login(req.login.clone(), req.password).await {
                Ok((_, session)) => {
                    info!("User {} registered successfully", req.login);
                    Ok(Json(AuthResponse {
                        token: session.token,
                        user_id: user.id,
                        login: user.login,
                    }))
                }
                Err(e) => {
                    warn!("Login after signup failed: {}", e);
                    Err((
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse {
                            error: "Account created but login failed".to_string(),
                        }),
                    ))
                }
            }
        }
        Err(e) => {
            warn!("Signup failed for {}: {}", req.login, e);
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("POST /auth/login - {}", req.login);

    match state.auth.login(req.login.clone(), req.password).await {
        Ok((user, session)) => {
            info!("User {} logged in successfully", user.login);
            Ok(Json(AuthResponse {
                token: session.token,
                user_id: user.id,
                login: user.login,
            }))
        }
        Err(e) => {
            warn!("Login failed for {}: {}", req.login, e);
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid credentials".to_string(),
                }),
            ))
        }
    }
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    info!("POST /auth/logout");

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) => match state.auth.logout(token).await {
            Ok(()) => StatusCode::OK,
            Err(e) => {
                warn!("Logout failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        None => StatusCode::UNAUTHORIZED,
    }
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, (StatusCode, Json<ErrorResponse>)> {
    let user = super::authorize(&state, &headers).await?;
    Ok(Json(user))
}
