//! Services the router depends on but does not implement itself.
//!
//! Methods return boxed `'static` futures so the traits stay object safe
//! and implementations can hop onto blocking threads.

use crate::sender::Sender;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            name: name.into(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDialogOptions {
    pub title: String,
    pub default_name: Option<String>,
    pub directory: Option<PathBuf>,
    pub filters: Vec<FileFilter>,
}

/// Native file pickers. `None` or an empty selection means the user
/// cancelled.
pub trait Dialogs: Send + Sync {
    fn save_file(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>>;
    fn open_files(&self, options: FileDialogOptions) -> BoxFuture<'static, Vec<PathBuf>>;
    fn open_directory(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>>;
}

/// Script bundle request. `entries` maps bundle names to entry modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub entries: BTreeMap<String, PathBuf>,
    pub infrastructure: bool,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no build command configured")]
    NotConfigured,
    #[error("failed to start build: {0}")]
    Spawn(#[source] io::Error),
    #[error("build exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("failed to read build output {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to walk build output: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to encode build entries: {0}")]
    Entries(#[from] serde_json::Error),
}

/// In-memory snapshot of a build's output directory, keyed by absolute
/// slash paths such as `/renderer.js`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl OutputFs {
    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let key = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self.files.insert(key, contents.into());
    }

    pub fn read(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// `None` when the file is absent or not UTF-8.
    pub fn read_to_string(&self, path: &str) -> Option<String> {
        self.read(path)
            .and_then(|bytes| String::from_utf8(bytes.to_vec()).ok())
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

pub trait BuildPipeline: Send + Sync {
    fn build(&self, request: BuildRequest) -> BoxFuture<'static, Result<OutputFs, BuildError>>;
}

/// Native menus. Implementations may emit envelopes back onto the host bus
/// through `sender` when an item is picked.
pub trait MenuBuilder: Send + Sync {
    fn build_menu(&self, menu: Value, sender: Sender);
    fn context_menu(&self, element: Value, sender: Sender);
}

pub trait Updater: Send + Sync {
    fn check_for_updates(&self, sender: Sender);
}

/// Menu builder for hosts without native chrome. Remembers what it was
/// asked to show.
#[derive(Debug, Default)]
pub struct HeadlessMenu {
    last_menu: Mutex<Option<Value>>,
    last_context: Mutex<Option<Value>>,
}

impl HeadlessMenu {
    pub fn last_menu(&self) -> Option<Value> {
        self.last_menu.lock().ok().and_then(|m| m.clone())
    }

    pub fn last_context(&self) -> Option<Value> {
        self.last_context.lock().ok().and_then(|m| m.clone())
    }
}

fn remember(slot: &Mutex<Option<Value>>, value: Value) {
    match slot.lock() {
        Ok(mut slot) => *slot = Some(value),
        Err(e) => warn!("failed to record menu: {e}"),
    }
}

impl MenuBuilder for HeadlessMenu {
    fn build_menu(&self, menu: Value, _sender: Sender) {
        info!("application menu updated");
        remember(&self.last_menu, menu);
    }

    fn context_menu(&self, element: Value, _sender: Sender) {
        info!("context menu requested");
        remember(&self.last_context, element);
    }
}

/// Updater that never checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledUpdater;

impl Updater for DisabledUpdater {
    fn check_for_updates(&self, _sender: Sender) {
        info!("update checks are disabled");
    }
}
