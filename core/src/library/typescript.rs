//! Component library scanner for TypeScript sources and typings.
//!
//! Every interface named `<Name>Props` describes a pattern `<Name>`. Its
//! property signatures become properties or slots depending on their type.
//! Context ids are derived from the source layout:
//!
//! - pattern: `<relative path>:<Name>`
//! - property / slot: the member name, scoped by the pattern
//! - enum option: the member name or literal value, scoped by the property

use super::analysis::{
    AnalyzerError, EnumOptionAnalysis, LibraryAnalysis, LibraryAnalyzer, PatternAnalysis,
    PropertyAnalysis, PropertyType, SlotAnalysis,
};
use super::IdAssignment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tree_sitter::{Language, Node, Parser};
use walkdir::{DirEntry, WalkDir};

const PROPS_SUFFIX: &str = "Props";
const MANIFEST: &str = "package.json";
const SLOT_TYPES: [&str; 4] = ["ReactNode", "ReactElement", "ReactChild", "JSX.Element"];

static DOC_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@(\w+)\s*(.*)$").unwrap());

/// Default [`LibraryAnalyzer`] backed by tree-sitter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeScriptAnalyzer;

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct DocComment {
    description: Option<String>,
    tags: HashMap<String, String>,
}

impl DocComment {
    fn parse(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix("/**")?.strip_suffix("*/")?;
        let mut doc = DocComment::default();
        let mut text = Vec::new();
        for line in body.lines() {
            let line = line.trim().trim_start_matches('*').trim();
            if line.is_empty() {
                continue;
            }
            match DOC_TAG.captures(line) {
                Some(caps) => {
                    doc.tags.insert(caps[1].to_string(), caps[2].trim().to_string());
                }
                None => text.push(line),
            }
        }
        if !text.is_empty() {
            doc.description = Some(text.join(" "));
        }
        Some(doc)
    }

    fn has(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    fn tag(&self, tag: &str) -> Option<&str> {
        self.tags
            .get(tag)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
struct EnumMember {
    name: String,
    value: String,
}

#[derive(Debug)]
struct Member {
    name: String,
    type_text: String,
    optional: bool,
    docs: DocComment,
}

#[derive(Debug)]
struct Component {
    export_name: String,
    docs: DocComment,
    members: Vec<Member>,
}

#[derive(Debug, Default)]
struct ParsedSource {
    components: Vec<Component>,
    enums: HashMap<String, Vec<EnumMember>>,
}

enum MemberKind {
    Slot,
    Property(PropertyType, Vec<EnumMember>),
    Unsupported,
}

impl LibraryAnalyzer for TypeScriptAnalyzer {
    fn analyze(
        &self,
        path: &Path,
        ids: &mut dyn IdAssignment,
    ) -> Result<LibraryAnalysis, AnalyzerError> {
        if !path.is_dir() {
            return Err(AnalyzerError::MissingFolder(path.to_path_buf()));
        }
        let manifest = read_manifest(path);
        let mut patterns = Vec::new();
        for source_path in collect_sources(path)? {
            let text = std::fs::read_to_string(&source_path).map_err(|source| {
                AnalyzerError::Io {
                    path: source_path.clone(),
                    source,
                }
            })?;
            let parsed = parse_source(&source_path, &text)?;
            let relative = relative_path(path, &source_path);
            for component in parsed.components {
                patterns.push(build_pattern(&relative, component, &parsed.enums, ids));
            }
        }

        let name = manifest
            .name
            .or_else(|| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();
        info!(library = %name, path = %path.display(), patterns = patterns.len(), "analyzed pattern library");
        Ok(LibraryAnalysis {
            path: path.to_path_buf(),
            name,
            version: manifest.version,
            description: manifest.description,
            patterns,
        })
    }
}

fn read_manifest(root: &Path) -> PackageManifest {
    let path = root.join(MANIFEST);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return PackageManifest::default();
    };
    match serde_json::from_str(&data) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(path = %path.display(), "ignoring invalid package manifest: {e}");
            PackageManifest::default()
        }
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.') || name == "node_modules")
            .unwrap_or(true)
}

/// Typings win over sources so a compiled package is not scanned twice.
fn collect_sources(root: &Path) -> Result<Vec<PathBuf>, AnalyzerError> {
    let mut typings = Vec::new();
    let mut sources = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".d.ts") {
            typings.push(entry.into_path());
        } else if name.ends_with(".ts") || name.ends_with(".tsx") {
            sources.push(entry.into_path());
        }
    }
    Ok(if typings.is_empty() { sources } else { typings })
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn language_for(path: &Path) -> Language {
    let is_tsx = path.extension().and_then(|e| e.to_str()) == Some("tsx");
    if is_tsx {
        tree_sitter_typescript::LANGUAGE_TSX.into()
    } else {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }
}

fn parse_source(path: &Path, text: &str) -> Result<ParsedSource, AnalyzerError> {
    let mut parser = Parser::new();
    parser.set_language(&language_for(path))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| AnalyzerError::Parse(path.to_path_buf()))?;
    if tree.root_node().has_error() {
        debug!(path = %path.display(), "source contains syntax errors, analyzing what parsed");
    }
    let mut parsed = ParsedSource::default();
    collect_declarations(tree.root_node(), text.as_bytes(), &mut parsed);
    Ok(parsed)
}

fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or_default()
}

fn unquote(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .to_string()
}

fn collect_declarations(node: Node<'_>, source: &[u8], parsed: &mut ParsedSource) {
    match node.kind() {
        "interface_declaration" => {
            if let Some(component) = parse_interface(node, source) {
                parsed.components.push(component);
            }
            return;
        }
        "enum_declaration" => {
            if let Some((name, members)) = parse_enum(node, source) {
                parsed.enums.insert(name, members);
            }
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_declarations(child, source, parsed);
    }
}

/// JSDoc block directly above `node`, looking through `export`/`declare`
/// wrappers.
fn leading_docs(node: Node<'_>, source: &[u8]) -> DocComment {
    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if matches!(parent.kind(), "export_statement" | "ambient_declaration") {
            anchor = parent;
        } else {
            break;
        }
    }
    anchor
        .prev_named_sibling()
        .filter(|prev| prev.kind() == "comment")
        .and_then(|comment| DocComment::parse(node_text(comment, source)))
        .unwrap_or_default()
}

fn parse_interface(node: Node<'_>, source: &[u8]) -> Option<Component> {
    let name = node_text(node.child_by_field_name("name")?, source);
    let export_name = name.strip_suffix(PROPS_SUFFIX).filter(|n| !n.is_empty())?;
    let docs = leading_docs(node, source);
    if docs.has("ignore") {
        return None;
    }
    let body = node.child_by_field_name("body")?;
    let mut members = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        if child.kind() != "property_signature" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        let type_text = child
            .child_by_field_name("type")
            .map(|t| node_text(t, source).trim_start_matches(':').trim().to_string())
            .unwrap_or_default();
        members.push(Member {
            name: unquote(node_text(name_node, source)),
            type_text,
            optional: is_optional(child),
            docs: leading_docs(child, source),
        });
    }
    Some(Component {
        export_name: export_name.to_string(),
        docs,
        members,
    })
}

fn is_optional(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let optional = node.children(&mut cursor).any(|c| c.kind() == "?");
    optional
}

fn parse_enum(node: Node<'_>, source: &[u8]) -> Option<(String, Vec<EnumMember>)> {
    let name = node_text(node.child_by_field_name("name")?, source).to_string();
    let body = node.child_by_field_name("body")?;
    let mut members = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        match child.kind() {
            "property_identifier" | "string" => {
                let member = unquote(node_text(child, source));
                members.push(EnumMember {
                    value: member.clone(),
                    name: member,
                });
            }
            "enum_assignment" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let member = unquote(node_text(name_node, source));
                let value = child
                    .child_by_field_name("value")
                    .map(|v| unquote(node_text(v, source)))
                    .unwrap_or_else(|| member.clone());
                members.push(EnumMember {
                    name: member,
                    value,
                });
            }
            _ => {}
        }
    }
    Some((name, members))
}

/// Splits a union on `|` outside string literals. Whitespace is dropped
/// except inside quotes; `undefined` and `null` members are removed.
fn union_parts(type_text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in type_text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '|' => parts.push(std::mem::take(&mut current)),
                c if c.is_whitespace() => {}
                c => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .filter(|part| !part.is_empty() && part != "undefined" && part != "null")
        .collect()
}

/// `'a' | 'b'` becomes an enum whose options are the literals.
fn literal_union(parts: &[String]) -> Option<Vec<EnumMember>> {
    if parts.is_empty() {
        return None;
    }
    parts
        .iter()
        .map(|part| {
            let mut chars = part.chars();
            let open = chars.next()?;
            let close = chars.next_back()?;
            let quoted = (open == '\'' || open == '"') && close == open;
            quoted.then(|| {
                let literal = chars.as_str().to_string();
                EnumMember {
                    name: literal.clone(),
                    value: literal,
                }
            })
        })
        .collect()
}

fn classify(member: &Member, enums: &HashMap<String, Vec<EnumMember>>) -> MemberKind {
    let parts = union_parts(&member.type_text);
    let compact = parts.join("|");

    if SLOT_TYPES
        .iter()
        .any(|slot| compact.ends_with(slot) || compact.ends_with(&format!("{slot}[]")))
    {
        return MemberKind::Slot;
    }
    let scalar = match compact.as_str() {
        "string" if member.docs.has("asset") => Some(PropertyType::Asset),
        "string" => Some(PropertyType::String),
        "number" => Some(PropertyType::Number),
        "boolean" => Some(PropertyType::Boolean),
        "string[]" | "Array<string>" => Some(PropertyType::StringArray),
        "number[]" | "Array<number>" => Some(PropertyType::NumberArray),
        _ => None,
    };
    if let Some(kind) = scalar {
        return MemberKind::Property(kind, Vec::new());
    }
    if let Some(options) = literal_union(&parts) {
        return MemberKind::Property(PropertyType::Enum, options);
    }
    match enums.get(&compact) {
        Some(options) => MemberKind::Property(PropertyType::Enum, options.clone()),
        None => MemberKind::Unsupported,
    }
}

fn build_pattern(
    relative: &str,
    component: Component,
    enums: &HashMap<String, Vec<EnumMember>>,
    ids: &mut dyn IdAssignment,
) -> PatternAnalysis {
    let context_id = format!("{relative}:{}", component.export_name);
    let pattern_id = ids.assign_pattern_id(&context_id);
    let mut properties = Vec::new();
    let mut slots = Vec::new();

    for member in &component.members {
        if member.docs.has("ignore") {
            continue;
        }
        let label = member
            .docs
            .tag("name")
            .map(str::to_string)
            .unwrap_or_else(|| member.name.clone());
        match classify(member, enums) {
            MemberKind::Slot => slots.push(SlotAnalysis {
                id: ids.assign_slot_id(&pattern_id, &member.name),
                context_id: member.name.clone(),
                name: member.name.clone(),
                label,
                required: !member.optional,
            }),
            MemberKind::Property(kind, options) => {
                let id = ids.assign_property_id(&pattern_id, &member.name);
                let options = options
                    .into_iter()
                    .map(|option| EnumOptionAnalysis {
                        id: ids.assign_enum_option_id(&id, &option.name),
                        context_id: option.name.clone(),
                        name: option.name,
                        value: option.value,
                    })
                    .collect();
                properties.push(PropertyAnalysis {
                    id,
                    context_id: member.name.clone(),
                    name: member.name.clone(),
                    label,
                    description: member.docs.description.clone(),
                    kind,
                    required: !member.optional,
                    default_value: member.docs.tag("default").map(str::to_string),
                    options,
                });
            }
            MemberKind::Unsupported => {
                debug!(pattern = %context_id, member = %member.name, ty = %member.type_text, "skipping member of unsupported type");
            }
        }
    }

    PatternAnalysis {
        id: pattern_id,
        name: component
            .docs
            .tag("name")
            .map(str::to_string)
            .unwrap_or_else(|| component.export_name.clone()),
        context_id,
        export_name: component.export_name,
        path: relative.to_string(),
        description: component.docs.description,
        properties,
        slots,
    }
}
