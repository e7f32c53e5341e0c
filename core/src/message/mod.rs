//! Envelope vocabulary exchanged between the host process and the UI.
//!
//! Every envelope on the wire is a JSON object `{ "id", "type", "payload" }`.
//! The `type` tag selects a [`Message`] variant and fully determines the shape
//! of `payload`; payload-less variants omit the field.

mod preview;

pub use preview::{PreviewEnvelope, PreviewMessage};

use crate::connections::Connection;
use crate::library::{LibraryAnalysis, PatternLibrary};
use crate::project::Project;
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Correlation token shared by a request and its replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope payload did not serialize to an object")]
    NotAnObject,
}

/// Host/UI message vocabulary. The first block is UI → host, the second
/// host → UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    AppLoaded,
    CheckForUpdatesRequest,
    CreateNewFileRequest,
    OpenFileRequest,
    AssetReadRequest,
    Save(SavePayload),
    ProjectClosed,
    CreateScriptBundleRequest,
    ExportHtml(ExportPayload),
    ExportPdf(ExportPayload),
    ExportPng(ExportPayload),
    ExportSketch(ExportPayload),
    ConnectPatternLibraryRequest(LibraryRequestPayload),
    UpdatePatternLibraryRequest(LibraryRequestPayload),
    ConnectedPatternLibraryNotification(Connection),
    CheckLibraryRequest(CheckLibraryRequestPayload),
    UpdateMenu(Value),
    ContextElementMenuRequest(Value),

    StartApp(StartAppPayload),
    CreateNewFileResponse(ProjectPayload),
    CreateNewFileError(RequestError),
    OpenFileResponse(ProjectPayload),
    OpenFileError(RequestError),
    AssetReadResponse(String),
    AssetReadError(RequestError),
    CreateScriptBundleResponse(Vec<BundleArtifact>),
    CreateScriptBundleError(RequestError),
    ConnectPatternLibraryResponse(LibraryConnectedPayload),
    ConnectPatternLibraryError(RequestError),
    CheckLibraryResponse(Vec<LibraryCheck>),
    SelectElement(Value),
    HighlightElement(Value),
    UnhighlightElement(Value),
}

impl Message {
    /// Wire tag of this message, used for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::AppLoaded => "app-loaded",
            Message::CheckForUpdatesRequest => "check-for-updates-request",
            Message::CreateNewFileRequest => "create-new-file-request",
            Message::OpenFileRequest => "open-file-request",
            Message::AssetReadRequest => "asset-read-request",
            Message::Save(_) => "save",
            Message::ProjectClosed => "project-closed",
            Message::CreateScriptBundleRequest => "create-script-bundle-request",
            Message::ExportHtml(_) => "export-html",
            Message::ExportPdf(_) => "export-pdf",
            Message::ExportPng(_) => "export-png",
            Message::ExportSketch(_) => "export-sketch",
            Message::ConnectPatternLibraryRequest(_) => "connect-pattern-library-request",
            Message::UpdatePatternLibraryRequest(_) => "update-pattern-library-request",
            Message::ConnectedPatternLibraryNotification(_) => {
                "connected-pattern-library-notification"
            }
            Message::CheckLibraryRequest(_) => "check-library-request",
            Message::UpdateMenu(_) => "update-menu",
            Message::ContextElementMenuRequest(_) => "context-element-menu-request",
            Message::StartApp(_) => "start-app",
            Message::CreateNewFileResponse(_) => "create-new-file-response",
            Message::CreateNewFileError(_) => "create-new-file-error",
            Message::OpenFileResponse(_) => "open-file-response",
            Message::OpenFileError(_) => "open-file-error",
            Message::AssetReadResponse(_) => "asset-read-response",
            Message::AssetReadError(_) => "asset-read-error",
            Message::CreateScriptBundleResponse(_) => "create-script-bundle-response",
            Message::CreateScriptBundleError(_) => "create-script-bundle-error",
            Message::ConnectPatternLibraryResponse(_) => "connect-pattern-library-response",
            Message::ConnectPatternLibraryError(_) => "connect-pattern-library-error",
            Message::CheckLibraryResponse(_) => "check-library-response",
            Message::SelectElement(_) => "select-element",
            Message::HighlightElement(_) => "highlight-element",
            Message::UnhighlightElement(_) => "unhighlight-element",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePayload {
    pub path: PathBuf,
    pub project: Project,
}

/// Encoding of [`ExportPayload::content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub path: PathBuf,
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRequestPayload {
    pub library: PatternLibrary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLibraryRequestPayload {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAppPayload {
    pub port: u16,
}

/// A project document together with the file it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub path: PathBuf,
    pub contents: Project,
}

/// Payload of every `*-error` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub message: String,
}

impl RequestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn at(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

/// One named output of the script bundle build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleArtifact {
    pub name: String,
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConnectedPayload {
    pub analysis: LibraryAnalysis,
    /// The library with every id allocated during the analysis.
    pub library: PatternLibrary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCheck {
    pub id: String,
    pub path: PathBuf,
    pub connected: bool,
}

/// A [`Message`] tagged with its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: MessageId,
    pub message: Message,
}

impl Envelope {
    /// Wraps `message` under a fresh id.
    pub fn new(message: Message) -> Self {
        Self {
            id: MessageId::new(),
            message,
        }
    }

    /// Wraps `message` under the id of the request it answers.
    pub fn reply(id: &MessageId, message: Message) -> Self {
        Self {
            id: id.clone(),
            message,
        }
    }

    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let (id, message) = WireEnvelope::parse(text)?.into_parts()?;
        Ok(Self { id, message })
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error;
        let fields = tagged_fields(&self.message).map_err(S::Error::custom)?;
        let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
        map.serialize_entry("id", &self.id)?;
        for (key, value) in &fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let (id, message) = WireEnvelope::deserialize(deserializer)?
            .into_parts()
            .map_err(D::Error::custom)?;
        Ok(Self { id, message })
    }
}

/// Serializes an adjacently tagged message into its `type`/`payload` fields.
pub(crate) fn tagged_fields<M: Serialize>(message: &M) -> Result<Map<String, Value>, EnvelopeError> {
    match serde_json::to_value(message)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(EnvelopeError::NotAnObject),
    }
}

/// Untyped envelope as it appears on the wire.
#[derive(Debug, Deserialize)]
pub(crate) struct WireEnvelope {
    id: MessageId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl WireEnvelope {
    pub(crate) fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Resolves the `type` tag against the vocabulary `M`.
    pub(crate) fn into_parts<M: DeserializeOwned>(
        self,
    ) -> Result<(MessageId, M), serde_json::Error> {
        let mut tagged = Map::new();
        tagged.insert("type".into(), Value::String(self.kind));
        if let Some(payload) = self.payload {
            tagged.insert("payload".into(), payload);
        }
        let message = serde_json::from_value(Value::Object(tagged))?;
        Ok((self.id, message))
    }
}
