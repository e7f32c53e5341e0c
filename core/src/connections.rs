//! User-scoped record of which pattern library lives in which folder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which the connection list is stored.
pub const CONNECTIONS_KEY: &str = "connections";

const STORE_DIR: &str = "alva";
const STORE_FILE: &str = "store.json";

/// Association of a pattern library id with a local folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub path: PathBuf,
}

impl Connection {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("user config directory is unavailable")]
    NoConfigDir,
}

/// Minimal durable key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Process-local store, mainly for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.lock() {
            Ok(values) => values.get(key).cloned(),
            Err(e) => {
                warn!("failed to lock memory store: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON object file holding all keys. Loaded once, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<Value>(&data) {
                Ok(Value::Object(values)) => values,
                Ok(_) | Err(_) => {
                    warn!(path = %path.display(), "ignoring malformed store file");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Store in the platform config directory of the current user.
    pub fn user_scoped() -> Result<Self, StoreError> {
        let dir = dirs::config_dir().ok_or(StoreError::NoConfigDir)?;
        Ok(Self::open(dir.join(STORE_DIR).join(STORE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = crate::persistence::temp_path(&self.path);
        std::fs::write(&tmp, serde_json::to_vec_pretty(values)?).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        match self.values.lock() {
            Ok(values) => values.get(key).cloned(),
            Err(e) => {
                warn!("failed to lock store: {e}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value);
        self.flush(&values)
    }
}

/// Deduplicated list of [`Connection`]s in a [`KeyValueStore`].
#[derive(Clone)]
pub struct ConnectionStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConnectionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored connections in first-seen order. Records that do not decode
    /// as a [`Connection`] are dropped.
    pub fn list(&self) -> Vec<Connection> {
        match self.store.get(CONNECTIONS_KEY) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<Connection>(item) {
                    Ok(connection) => Some(connection),
                    Err(e) => {
                        warn!("dropping malformed connection record: {e}");
                        None
                    }
                })
                .collect(),
            Some(other) => {
                warn!("ignoring connection list of unexpected shape: {other}");
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Appends `connection` unless a structurally equal one is stored.
    pub fn upsert(&self, connection: Connection) -> Result<(), StoreError> {
        let mut connections = self.list();
        connections.push(connection);
        let mut seen = HashSet::new();
        connections.retain(|c| seen.insert(c.clone()));
        debug!(count = connections.len(), "storing connections");
        self.store
            .set(CONNECTIONS_KEY, serde_json::to_value(&connections)?)
    }

    pub fn find_by_id(&self, id: &str) -> Option<Connection> {
        self.list().into_iter().find(|c| c.id == id)
    }

    pub fn find_all_by_id(&self, id: &str) -> Vec<Connection> {
        self.list().into_iter().filter(|c| c.id == id).collect()
    }
}
