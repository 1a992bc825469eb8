//! Server configuration and shared state

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::auth::AuthManager;
use crate::relay::RelayManager;

/// Configuration for the Courier Chat Server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// Data directory for the users database
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: PathBuf::from("courier_data"),
        }
    }
}

impl ServerConfig {
    /// Build the config from the environment, falling back to defaults.
    /// `COURIER_ADDR` overrides the bind address, `COURIER_ROOT` the data
    /// directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("COURIER_ADDR") {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!("Ignoring invalid COURIER_ADDR {:?}: {}", addr, e),
            }
        }
        if let Ok(root) = std::env::var("COURIER_ROOT") {
            config.data_dir = PathBuf::from(root);
        }
        config
    }

    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayManager>,
    pub auth: Arc<AuthManager>,
}
