//! Dispatch of host-bound envelopes.
//!
//! Every reply carries the id of the request it answers. Handlers that end
//! without a reply say so where they return.

use crate::collaborators::{
    BuildPipeline, BuildRequest, Dialogs, FileDialogOptions, FileFilter, MenuBuilder, Updater,
};
use crate::sender::{Sender, SenderError};
use alva_core::library::{LibraryAnalyzer, PatternLibrary};
use alva_core::message::{
    BundleArtifact, ContentEncoding, Envelope, ExportPayload, LibraryCheck,
    LibraryConnectedPayload, Message, MessageId, ProjectPayload, RequestError, SavePayload,
    StartAppPayload,
};
use alva_core::persistence::{self, PersistenceResult};
use alva_core::project::{Project, DEFAULT_PROJECT_NAME, FILE_EXTENSION};
use alva_core::ConnectionStore;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Script bundle outputs sent to the UI, as (name, output path).
pub const BUNDLE_ARTIFACTS: [(&str, &str); 2] =
    [("renderer", "/renderer.js"), ("preview", "/preview.js")];

/// External services the router delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub dialogs: Arc<dyn Dialogs>,
    pub pipeline: Arc<dyn BuildPipeline>,
    pub menu: Arc<dyn MenuBuilder>,
    pub updater: Arc<dyn Updater>,
    pub analyzer: Arc<dyn LibraryAnalyzer>,
    pub connections: ConnectionStore,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouterSettings {
    /// Port announced to the UI with `start-app`.
    pub port: u16,
    /// Reopen the last project when the UI (re)loads.
    pub dev_mode: bool,
}

/// Per-process state shared by all requests.
#[derive(Debug, Default)]
struct Session {
    last_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct Router {
    sender: Sender,
    collaborators: Collaborators,
    settings: RouterSettings,
    session: Arc<Mutex<Session>>,
}

fn project_filter() -> FileFilter {
    FileFilter::new("Alva File", &[FILE_EXTENSION])
}

impl Router {
    pub fn new(sender: Sender, collaborators: Collaborators, settings: RouterSettings) -> Self {
        Self {
            sender,
            collaborators,
            settings,
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    /// Makes this router the consumer of the sender's host bus.
    pub fn listen(self) -> Result<JoinHandle<()>, SenderError> {
        let sender = self.sender.clone();
        sender.receive(move |envelope| {
            let router = self.clone();
            async move { router.handle(envelope).await }
        })
    }

    /// Path of the project most recently created, opened or saved.
    pub fn last_path(&self) -> Option<PathBuf> {
        self.session.lock().ok().and_then(|s| s.last_path.clone())
    }

    fn set_last_path(&self, path: Option<PathBuf>) {
        match self.session.lock() {
            Ok(mut session) => session.last_path = path,
            Err(e) => error!("session lock poisoned: {e}"),
        }
    }

    fn reply(&self, id: &MessageId, message: Message) {
        self.sender.send(Envelope::reply(id, message));
    }

    pub async fn handle(&self, envelope: Envelope) {
        let Envelope { id, message } = envelope;
        debug!(%id, kind = message.tag(), "handling message");
        match message {
            Message::CheckForUpdatesRequest => {
                self.collaborators.updater.check_for_updates(self.sender.clone())
            }
            Message::AppLoaded => self.app_loaded(&id).await,
            Message::CreateNewFileRequest => self.create_new_file(&id).await,
            Message::OpenFileRequest => self.open_file(&id).await,
            Message::AssetReadRequest => self.read_asset(&id).await,
            Message::Save(payload) => self.save(payload).await,
            Message::ProjectClosed => {
                // No reply.
                self.set_last_path(None);
            }
            Message::CreateScriptBundleRequest => self.create_script_bundle(&id).await,
            Message::ExportHtml(payload)
            | Message::ExportPdf(payload)
            | Message::ExportPng(payload)
            | Message::ExportSketch(payload) => export(payload).await,
            Message::ConnectPatternLibraryRequest(payload) => {
                self.connect_library(&id, payload.library).await
            }
            Message::UpdatePatternLibraryRequest(payload) => {
                self.update_library(&id, payload.library).await
            }
            Message::ConnectedPatternLibraryNotification(connection) => {
                if let Err(e) = self.collaborators.connections.upsert(connection) {
                    error!("failed to store library connection: {e}");
                }
            }
            Message::CheckLibraryRequest(payload) => self.check_library(&id, &payload.id).await,
            Message::UpdateMenu(menu) => {
                self.collaborators.menu.build_menu(menu, self.sender.clone())
            }
            Message::ContextElementMenuRequest(element) => {
                self.collaborators
                    .menu
                    .context_menu(element, self.sender.clone())
            }
            outbound @ (Message::StartApp(_)
            | Message::CreateNewFileResponse(_)
            | Message::CreateNewFileError(_)
            | Message::OpenFileResponse(_)
            | Message::OpenFileError(_)
            | Message::AssetReadResponse(_)
            | Message::AssetReadError(_)
            | Message::CreateScriptBundleResponse(_)
            | Message::CreateScriptBundleError(_)
            | Message::ConnectPatternLibraryResponse(_)
            | Message::ConnectPatternLibraryError(_)
            | Message::CheckLibraryResponse(_)
            | Message::SelectElement(_)
            | Message::HighlightElement(_)
            | Message::UnhighlightElement(_)) => {
                warn!(%id, kind = outbound.tag(), "ignoring ui-bound message on host bus");
            }
        }
    }

    async fn app_loaded(&self, id: &MessageId) {
        if self.settings.dev_mode {
            if let Some(path) = self.last_path() {
                match persistence::read_project(&path).await {
                    PersistenceResult::Success { contents } => self.reply(
                        id,
                        Message::OpenFileResponse(ProjectPayload { path, contents }),
                    ),
                    PersistenceResult::Error { cause } => {
                        warn!(path = %path.display(), "could not reopen last project: {cause}")
                    }
                }
            }
        }
        self.reply(
            id,
            Message::StartApp(StartAppPayload {
                port: self.settings.port,
            }),
        );
    }

    async fn create_new_file(&self, id: &MessageId) {
        let options = FileDialogOptions {
            title: "Create New Alva File".into(),
            default_name: Some(format!("{DEFAULT_PROJECT_NAME}.{FILE_EXTENSION}")),
            filters: vec![project_filter()],
            ..FileDialogOptions::default()
        };
        let Some(path) = self.collaborators.dialogs.save_file(options).await else {
            // Cancelled: no reply.
            return;
        };
        let project = Project::create(&path);
        match persistence::persist(&path, &project).await {
            Ok(()) => {
                self.set_last_path(Some(path.clone()));
                info!(path = %path.display(), "created project");
                self.reply(
                    id,
                    Message::CreateNewFileResponse(ProjectPayload {
                        path,
                        contents: project,
                    }),
                );
            }
            Err(e) => {
                error!(path = %path.display(), "failed to create project: {e}");
                self.reply(
                    id,
                    Message::CreateNewFileError(RequestError::at(path, e.to_string())),
                );
            }
        }
    }

    async fn open_file(&self, id: &MessageId) {
        let options = FileDialogOptions {
            title: "Open Alva File".into(),
            filters: vec![project_filter()],
            ..FileDialogOptions::default()
        };
        let Some(path) = self
            .collaborators
            .dialogs
            .open_files(options)
            .await
            .into_iter()
            .next()
        else {
            // Cancelled or nothing selected: no reply.
            return;
        };
        match persistence::read_project(&path).await {
            PersistenceResult::Success { contents } => {
                self.set_last_path(Some(path.clone()));
                self.reply(
                    id,
                    Message::OpenFileResponse(ProjectPayload { path, contents }),
                );
            }
            PersistenceResult::Error { cause } => {
                self.reply(id, Message::OpenFileError(RequestError::at(path, cause)));
            }
        }
    }

    async fn read_asset(&self, id: &MessageId) {
        let options = FileDialogOptions {
            title: "Select Asset".into(),
            ..FileDialogOptions::default()
        };
        let Some(path) = self
            .collaborators
            .dialogs
            .open_files(options)
            .await
            .into_iter()
            .next()
        else {
            // Cancelled or nothing selected: no reply.
            return;
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => self.reply(id, Message::AssetReadResponse(data_uri(&path, &bytes))),
            Err(e) => {
                warn!(path = %path.display(), "failed to read asset: {e}");
                self.reply(
                    id,
                    Message::AssetReadError(RequestError::at(path, e.to_string())),
                );
            }
        }
    }

    /// No reply in either case.
    async fn save(&self, payload: SavePayload) {
        let SavePayload { path, project } = payload;
        let project = project.with_path(&path);
        match persistence::persist(&path, &project).await {
            Ok(()) => {
                debug!(path = %path.display(), "saved project");
                self.set_last_path(Some(path));
            }
            Err(e) => error!(path = %path.display(), "failed to save project: {e}"),
        }
    }

    async fn create_script_bundle(&self, id: &MessageId) {
        let request = BuildRequest {
            infrastructure: true,
            ..BuildRequest::default()
        };
        let output = match self.collaborators.pipeline.build(request).await {
            Ok(output) => output,
            Err(e) => {
                error!("script bundle build failed: {e}");
                self.reply(
                    id,
                    Message::CreateScriptBundleError(RequestError::new(e.to_string())),
                );
                return;
            }
        };
        let mut artifacts = Vec::with_capacity(BUNDLE_ARTIFACTS.len());
        for (name, path) in BUNDLE_ARTIFACTS {
            let Some(contents) = output.read_to_string(path) else {
                error!(artifact = path, "script bundle artifact missing");
                self.reply(
                    id,
                    Message::CreateScriptBundleError(RequestError::at(
                        path,
                        format!("build produced no readable {path}"),
                    )),
                );
                return;
            };
            artifacts.push(BundleArtifact {
                name: name.to_string(),
                path: path.to_string(),
                contents,
            });
        }
        self.reply(id, Message::CreateScriptBundleResponse(artifacts));
    }

    async fn connect_library(&self, id: &MessageId, library: PatternLibrary) {
        let options = FileDialogOptions {
            title: "Connect Pattern Library".into(),
            ..FileDialogOptions::default()
        };
        let Some(path) = self.collaborators.dialogs.open_directory(options).await else {
            // Cancelled: no reply.
            return;
        };
        self.analyze_and_reply(id, path, library).await;
    }

    async fn update_library(&self, id: &MessageId, library: PatternLibrary) {
        let Some(connection) = self.collaborators.connections.find_by_id(&library.id) else {
            // Never connected on this machine: no reply.
            debug!(library = %library.id, "no connection to update from");
            return;
        };
        self.analyze_and_reply(id, connection.path, library).await;
    }

    async fn analyze_and_reply(&self, id: &MessageId, path: PathBuf, library: PatternLibrary) {
        match self.analyze(path.clone(), library).await {
            Ok(payload) => self.reply(id, Message::ConnectPatternLibraryResponse(payload)),
            Err(message) => {
                warn!(path = %path.display(), "pattern library analysis failed: {message}");
                self.reply(
                    id,
                    Message::ConnectPatternLibraryError(RequestError::at(path, message)),
                );
            }
        }
    }

    /// Runs the analyzer with `library` handing out the global ids.
    async fn analyze(
        &self,
        path: PathBuf,
        mut library: PatternLibrary,
    ) -> Result<LibraryConnectedPayload, String> {
        library.validate().map_err(|e| e.to_string())?;
        let analyzer = self.collaborators.analyzer.clone();
        let task = tokio::task::spawn_blocking(move || {
            analyzer
                .analyze(&path, &mut library)
                .map(|analysis| LibraryConnectedPayload { analysis, library })
        });
        match task.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("analyzer task failed: {e}")),
        }
    }

    /// One reply per stored connection, each sent as soon as its own check
    /// finishes.
    async fn check_library(&self, id: &MessageId, library_id: &str) {
        let checks = self
            .collaborators
            .connections
            .find_all_by_id(library_id)
            .into_iter()
            .map(|connection| async move {
                let connected = tokio::fs::try_exists(&connection.path)
                    .await
                    .unwrap_or(false);
                self.reply(
                    id,
                    Message::CheckLibraryResponse(vec![LibraryCheck {
                        id: connection.id,
                        path: connection.path,
                        connected,
                    }]),
                );
            });
        join_all(checks).await;
    }
}

/// Writes exported content; failures are logged only.
async fn export(payload: ExportPayload) {
    let ExportPayload {
        path,
        content,
        encoding,
    } = payload;
    let bytes = match encoding {
        ContentEncoding::Utf8 => content.into_bytes(),
        ContentEncoding::Base64 => match STANDARD.decode(content.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(path = %path.display(), "export content is not valid base64: {e}");
                return;
            }
        },
    };
    match tokio::fs::write(&path, bytes).await {
        Ok(()) => info!(path = %path.display(), "exported"),
        Err(e) => error!(path = %path.display(), "export failed: {e}"),
    }
}

/// Media type from well-known file signatures.
fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: [(&[u8], &str); 6] = [
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"BM", "image/bmp"),
    ];
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
}

fn data_uri(path: &Path, bytes: &[u8]) -> String {
    let mime = sniff_mime(bytes)
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
