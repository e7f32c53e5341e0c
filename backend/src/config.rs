use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;

/// Settings of the host process, read from `ALVA_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub host: String,
    /// `0` picks a free port; the bound port is announced with `start-app`.
    pub port: u16,
    /// Shared secret for the UI socket. No token means no auth.
    pub token: Option<String>,
    /// Reopen the last project on `app-loaded`.
    pub dev_mode: bool,
    pub max_connections: usize,
    pub channel_capacity: usize,
    /// Shell command producing the script bundle.
    pub build_command: Option<String>,
    /// Connection store file; defaults to the user config directory.
    pub store_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            token: None,
            dev_mode: false,
            max_connections: 16,
            channel_capacity: 100,
            build_command: None,
            store_path: None,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        Config::builder()
            .add_source(Environment::with_prefix("ALVA").try_parsing(true))
            .build()
            .ok()
            .and_then(|c| c.try_deserialize().ok())
            .unwrap_or_default()
    }
}
