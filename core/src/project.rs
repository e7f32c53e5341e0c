use crate::library::PatternLibrary;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Extension of project documents.
pub const FILE_EXTENSION: &str = "alva";

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";

fn new_project_id() -> String {
    Uuid::new_v4().to_string()
}

fn empty_document_tree() -> Value {
    json!({ "pages": [] })
}

/// A design document and the pattern library it was built against.
///
/// `path` is runtime state: it is never written into the file and is
/// ignored when a legacy file carries it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default = "new_project_id")]
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub path: Option<PathBuf>,
    pub pattern_library: PatternLibrary,
    /// Element tree owned by the UI; the host never inspects it.
    #[serde(default = "empty_document_tree")]
    pub document_tree: Value,
}

impl Project {
    /// Creates an empty project that will be stored at `path`, named after
    /// the file stem.
    pub fn create(path: &Path) -> Self {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PROJECT_NAME)
            .to_string();
        Self {
            id: new_project_id(),
            pattern_library: PatternLibrary::new(name.clone()),
            name,
            path: Some(path.to_path_buf()),
            document_tree: empty_document_tree(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}
