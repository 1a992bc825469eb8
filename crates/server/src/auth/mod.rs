//! Authentication Module
//!
//! Identity issuance for the relay: signup, login, and session management.
//! The relay core never authenticates; handlers validate a session here and
//! hand the core a plain identity string. User data lives in SQLite at
//! `<data_dir>/users.sqlite`.

use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum login length, matching the public signup form.
const MIN_LOGIN_LEN: usize = 3;
/// Minimum password length.
const MIN_PASSWORD_LEN: usize = 6;

/// User record stored in database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Public user info (no sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub login: String,
    pub created_at: DateTime<Utc>,
}

/// Session token for authenticated requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Auth manager handles all authentication
pub struct AuthManager {
    db_path: std::path::PathBuf,
    /// In-memory session cache
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthManager {
    /// Create new auth manager
    pub async fn new(base_dir: &std::path::Path) -> Result<Self> {
        let db_path = base_dir.join("users.sqlite");

        let manager = Self {
            db_path,
            sessions: RwLock::new(HashMap::new()),
        };

        manager.init_db().await?;

        info!("[Auth] Initialized at {:?}", manager.db_path);

        Ok(manager)
    }

    /// Initialize SQLite database
    async fn init_db(&self) -> Result<()> {
        let pool = self.get_pool().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                login TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_login TEXT
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        pool.close().await;
        Ok(())
    }

    /// Get database connection
    async fn get_pool(&self) -> Result<sqlx::SqlitePool> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(true);
        Ok(SqlitePoolOptions::new().connect_with(options).await?)
    }

    /// Register a new user
    pub async fn signup(&self, login: String, password: String) -> Result<User> {
        if login.len() < MIN_LOGIN_LEN {
            anyhow::bail!("Login must be at least {} characters", MIN_LOGIN_LEN);
        }
        if password.len() < MIN_PASSWORD_LEN {
            anyhow::bail!("Password must be at least {} characters", MIN_PASSWORD_LEN);
        }

        let pool = self.get_pool().await?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE login = ?")
            .bind(&login)
            .fetch_optional(&pool)
            .await?;

        if existing.is_some() {
            anyhow::bail!("Login already taken");
        }

        let password_hash = hash(&password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            login: login.clone(),
            password_hash,
            created_at: Utc::now(),
            last_login: None,
        };

        sqlx::query(
            "INSERT INTO users (id, login, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(user.created_at.to_rfc3339())
        .execute(&pool)
        .await?;

        pool.close().await;

        info!("[Auth] User registered: {}", login);

        Ok(user)
    }

    /// Login user and create session
    pub async fn login(&self, login: String, password: String) -> Result<(User, Session)> {
        let pool = self.get_pool().await?;

        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, login, password_hash, created_at FROM users WHERE login = ?",
        )
        .bind(&login)
        .fetch_optional(&pool)
        .await?;

        let (user_id, login, password_hash, created_at) =
            row.ok_or_else(|| anyhow::anyhow!("Invalid login or password"))?;

        let valid = verify(&password, &password_hash).context("Failed to verify password")?;

        if !valid {
            warn!("[Auth] Failed login attempt for {}", login);
            return Err(anyhow::anyhow!("Invalid login or password"));
        }

        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&user_id)
            .execute(&pool)
            .await?;

        let session = self.create_session(&pool, &user_id).await?;

        let user = User {
            id: user_id,
            login,
            password_hash: String::new(), // Don't return hash
            created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            last_login: Some(Utc::now()),
        };

        pool.close().await;

        info!("[Auth] User logged in: {}", user.login);

        Ok((user, session))
    }

    /// Create new session
    async fn create_session(&self, pool: &sqlx::SqlitePool, user_id: &str) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(30),
        };

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(pool)
        .await?;

        // Cache session
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        Ok(session)
    }

    /// Validate session token
    pub async fn validate_session(&self, token: &str) -> Result<UserInfo> {
        // Check cache first, evicting the entry if it has expired
        let cached_user = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(token) {
                Some(session) if session.expires_at > Utc::now() => {
                    Some(session.user_id.clone())
                }
                Some(_) => {
                    sessions.remove(token);
                    None
                }
                None => None,
            }
        };
        if let Some(user_id) = cached_user {
            return self.get_user(&user_id).await;
        }

        // Check database
        let pool = self.get_pool().await?;

        let row: Option<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.login, u.created_at, s.expires_at
            FROM users u
            JOIN sessions s ON u.id = s.user_id
            WHERE s.token = ?
            "#,
        )
        .bind(token)
        .fetch_optional(&pool)
        .await?;

        pool.close().await;

        if let Some((id, login, created_at, expires_at)) = row {
            let expires: DateTime<Utc> = expires_at
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid date"))?;
            if expires > Utc::now() {
                return Ok(UserInfo {
                    id,
                    login,
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                });
            }
        }

        Err(anyhow::anyhow!("Invalid or expired session"))
    }

    /// Logout user (invalidate session)
    pub async fn logout(&self, token: &str) -> Result<()> {
        // Remove from cache
        self.sessions.write().await.remove(token);

        // Remove from database
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&pool)
            .await?;
        pool.close().await;

        info!("[Auth] Session invalidated");

        Ok(())
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: &str) -> Result<UserInfo> {
        let pool = self.get_pool().await?;

        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, login, created_at FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&pool)
                .await?;

        pool.close().await;

        if let Some((id, login, created_at)) = row {
            Ok(UserInfo {
                id,
                login,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
        } else {
            Err(anyhow::anyhow!("User not found"))
        }
    }

    /// List all users (for contact discovery)
    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        let pool = self.get_pool().await?;

        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, login, created_at FROM users ORDER BY login")
                .fetch_all(&pool)
                .await?;

        pool.close().await;

        Ok(rows
            .into_iter()
            .map(|(id, login, created_at)| UserInfo {
                id,
                login,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }

    #[cfg(test)]
    async fn cache_session(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session);
    }

    #[cfg(test)]
    async fn session_is_cached(&self, token: &str) -> bool {
        self.sessions.read().await.contains_key(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn manager() -> (TempDir, AuthManager) {
        let dir = TempDir::new().unwrap();
        let auth = AuthManager::new(dir.path()).await.unwrap();
        (dir, auth)
    }

    #[tokio::test]
    async fn signup_login_validate_logout_round_trip() {
        let (_dir, auth) = manager().await;

        let user = auth
            .signup("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();
        assert_eq!(user.login, "alice");

        let (user, session) = auth
            .login("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();
        assert!(user.password_hash.is_empty());

        let info = auth.validate_session(&session.token).await.unwrap();
        assert_eq!(info.login, "alice");

        auth.logout(&session.token).await.unwrap();
        assert!(auth.validate_session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_login_is_rejected() {
        let (_dir, auth) = manager().await;
        auth.signup("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();

        let err = auth
            .signup("alice".to_string(), "different9".to_string())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }

    #[tokio::test]
    async fn short_credentials_are_rejected() {
        let (_dir, auth) = manager().await;

        assert!(auth
            .signup("al".to_string(), "secret123".to_string())
            .await
            .is_err());
        assert!(auth
            .signup("alice".to_string(), "short".to_string())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let (_dir, auth) = manager().await;
        auth.signup("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();

        assert!(auth
            .login("alice".to_string(), "wrongpass".to_string())
            .await
            .is_err());
        assert!(auth
            .login("nobody".to_string(), "secret123".to_string())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn expired_cached_session_is_evicted_on_validation() {
        let (_dir, auth) = manager().await;
        let user = auth
            .signup("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();

        let stale = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.id,
            created_at: Utc::now() - chrono::Duration::days(31),
            expires_at: Utc::now() - chrono::Duration::days(1),
        };
        auth.cache_session(stale.clone()).await;

        assert!(auth.validate_session(&stale.token).await.is_err());
        assert!(!auth.session_is_cached(&stale.token).await);
    }

    #[tokio::test]
    async fn list_users_returns_registered_accounts() {
        let (_dir, auth) = manager().await;
        auth.signup("bob".to_string(), "secret123".to_string())
            .await
            .unwrap();
        auth.signup("alice".to_string(), "secret123".to_string())
            .await
            .unwrap();

        let users = auth.list_users().await.unwrap();
        let logins: Vec<_> = users.iter().map(|u| u.login.as_str()).collect();
        assert_eq!(logins, vec!["alice", "bob"]);
    }
}
