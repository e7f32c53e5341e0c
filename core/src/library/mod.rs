//! Pattern libraries and their stable global id namespaces.
//!
//! A library scan only knows *context ids* (source-relative names that mean
//! something within one run). [`PatternLibrary`] turns them into *global
//! ids* that are persisted with the project. Each namespace is
//! allocate-once: a context id keeps its global id forever and a global id
//! is never handed to a second context id.

mod analysis;
mod typescript;

pub use analysis::{
    AnalyzerError, EnumOptionAnalysis, LibraryAnalysis, LibraryAnalyzer, PatternAnalysis,
    PropertyAnalysis, PropertyType, SlotAnalysis,
};
pub use typescript::TypeScriptAnalyzer;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Context id → global id.
pub type IdMap = BTreeMap<String, String>;

/// The four id namespaces of a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Pattern,
    Property,
    Slot,
    EnumOption,
}

impl IdKind {
    pub const ALL: [IdKind; 4] = [
        IdKind::Pattern,
        IdKind::Property,
        IdKind::Slot,
        IdKind::EnumOption,
    ];
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdKind::Pattern => "pattern",
            IdKind::Property => "property",
            IdKind::Slot => "slot",
            IdKind::EnumOption => "enum option",
        };
        f.write_str(name)
    }
}

/// A namespace together with its scope. Properties and slots are scoped by
/// the owning pattern's global id, enum options by the enum's global id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdNamespace<'a> {
    Pattern,
    Property { pattern_id: &'a str },
    Slot { pattern_id: &'a str },
    EnumOption { enum_id: &'a str },
}

impl IdNamespace<'_> {
    pub fn kind(&self) -> IdKind {
        match self {
            IdNamespace::Pattern => IdKind::Pattern,
            IdNamespace::Property { .. } => IdKind::Property,
            IdNamespace::Slot { .. } => IdKind::Slot,
            IdNamespace::EnumOption { .. } => IdKind::EnumOption,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LibraryError {
    #[error("{kind} id {global_id} is assigned to more than one context id")]
    DuplicateGlobalId { kind: IdKind, global_id: String },
}

/// Callbacks handed to a [`LibraryAnalyzer`].
pub trait IdAssignment {
    fn assign_pattern_id(&mut self, context_id: &str) -> String;
    fn assign_property_id(&mut self, pattern_id: &str, context_id: &str) -> String;
    fn assign_slot_id(&mut self, pattern_id: &str, context_id: &str) -> String;
    fn assign_enum_option_id(&mut self, enum_id: &str, context_id: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternLibrary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pattern_ids: IdMap,
    #[serde(default)]
    property_ids: BTreeMap<String, IdMap>,
    #[serde(default)]
    slot_ids: BTreeMap<String, IdMap>,
    #[serde(default)]
    enum_option_ids: BTreeMap<String, IdMap>,
}

impl PatternLibrary {
    /// Creates an empty library with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            pattern_ids: IdMap::new(),
            property_ids: BTreeMap::new(),
            slot_ids: BTreeMap::new(),
            enum_option_ids: BTreeMap::new(),
        }
    }

    /// Returns the global id of `context_id`, allocating one on first use.
    pub fn ensure_global_id(&mut self, namespace: IdNamespace<'_>, context_id: &str) -> String {
        if let Some(existing) = self.global_id(namespace, context_id) {
            return existing.to_string();
        }
        let kind = namespace.kind();
        let global_id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.is_allocated(kind, &candidate) {
                break candidate;
            }
        };
        self.scope_mut(namespace)
            .insert(context_id.to_string(), global_id.clone());
        debug!(library = %self.id, %kind, context_id, %global_id, "allocated global id");
        global_id
    }

    /// Looks up an already allocated global id without allocating.
    pub fn global_id(&self, namespace: IdNamespace<'_>, context_id: &str) -> Option<&str> {
        self.scope(namespace)
            .and_then(|ids| ids.get(context_id))
            .map(String::as_str)
    }

    /// Number of global ids allocated in the whole namespace.
    pub fn count(&self, kind: IdKind) -> usize {
        self.maps(kind).iter().map(|ids| ids.len()).sum()
    }

    /// Checks the allocate-once invariant on data loaded from disk or the UI.
    pub fn validate(&self) -> Result<(), LibraryError> {
        for kind in IdKind::ALL {
            let mut seen = HashSet::new();
            for global_id in self.maps(kind).into_iter().flat_map(|ids| ids.values()) {
                if !seen.insert(global_id.as_str()) {
                    return Err(LibraryError::DuplicateGlobalId {
                        kind,
                        global_id: global_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn is_allocated(&self, kind: IdKind, global_id: &str) -> bool {
        self.maps(kind)
            .iter()
            .any(|ids| ids.values().any(|id| id == global_id))
    }

    fn maps(&self, kind: IdKind) -> Vec<&IdMap> {
        match kind {
            IdKind::Pattern => vec![&self.pattern_ids],
            IdKind::Property => self.property_ids.values().collect(),
            IdKind::Slot => self.slot_ids.values().collect(),
            IdKind::EnumOption => self.enum_option_ids.values().collect(),
        }
    }

    fn scope(&self, namespace: IdNamespace<'_>) -> Option<&IdMap> {
        match namespace {
            IdNamespace::Pattern => Some(&self.pattern_ids),
            IdNamespace::Property { pattern_id } => self.property_ids.get(pattern_id),
            IdNamespace::Slot { pattern_id } => self.slot_ids.get(pattern_id),
            IdNamespace::EnumOption { enum_id } => self.enum_option_ids.get(enum_id),
        }
    }

    fn scope_mut(&mut self, namespace: IdNamespace<'_>) -> &mut IdMap {
        match namespace {
            IdNamespace::Pattern => &mut self.pattern_ids,
            IdNamespace::Property { pattern_id } => {
                self.property_ids.entry(pattern_id.to_string()).or_default()
            }
            IdNamespace::Slot { pattern_id } => {
                self.slot_ids.entry(pattern_id.to_string()).or_default()
            }
            IdNamespace::EnumOption { enum_id } => {
                self.enum_option_ids.entry(enum_id.to_string()).or_default()
            }
        }
    }
}

impl IdAssignment for PatternLibrary {
    fn assign_pattern_id(&mut self, context_id: &str) -> String {
        self.ensure_global_id(IdNamespace::Pattern, context_id)
    }

    fn assign_property_id(&mut self, pattern_id: &str, context_id: &str) -> String {
        self.ensure_global_id(IdNamespace::Property { pattern_id }, context_id)
    }

    fn assign_slot_id(&mut self, pattern_id: &str, context_id: &str) -> String {
        self.ensure_global_id(IdNamespace::Slot { pattern_id }, context_id)
    }

    fn assign_enum_option_id(&mut self, enum_id: &str, context_id: &str) -> String {
        self.ensure_global_id(IdNamespace::EnumOption { enum_id }, context_id)
    }
}
