use super::IdAssignment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scanner turning a library folder into a [`LibraryAnalysis`].
///
/// Implementations must take every global id from `ids`; they never invent
/// ids themselves.
pub trait LibraryAnalyzer: Send + Sync {
    fn analyze(
        &self,
        path: &Path,
        ids: &mut dyn IdAssignment,
    ) -> Result<LibraryAnalysis, AnalyzerError>;
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("library folder {0} does not exist")]
    MissingFolder(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk library folder: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to load TypeScript grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("failed to parse {0}")]
    Parse(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryAnalysis {
    pub path: PathBuf,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub patterns: Vec<PatternAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAnalysis {
    pub id: String,
    pub context_id: String,
    pub name: String,
    pub export_name: String,
    /// Source file, relative to the library folder.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<PropertyAnalysis>,
    pub slots: Vec<SlotAnalysis>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyType {
    Boolean,
    Number,
    String,
    StringArray,
    NumberArray,
    Asset,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAnalysis {
    pub id: String,
    pub context_id: String,
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: PropertyType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Only populated for [`PropertyType::Enum`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<EnumOptionAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAnalysis {
    pub id: String,
    pub context_id: String,
    pub name: String,
    pub label: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumOptionAnalysis {
    pub id: String,
    pub context_id: String,
    pub name: String,
    pub value: String,
}

impl LibraryAnalysis {
    pub fn pattern(&self, export_name: &str) -> Option<&PatternAnalysis> {
        self.patterns.iter().find(|p| p.export_name == export_name)
    }
}

impl PatternAnalysis {
    pub fn property(&self, name: &str) -> Option<&PropertyAnalysis> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn slot(&self, name: &str) -> Option<&SlotAnalysis> {
        self.slots.iter().find(|s| s.name == name)
    }
}
