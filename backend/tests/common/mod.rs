#![allow(dead_code)]

use alva_backend::collaborators::{
    BuildError, BuildPipeline, BuildRequest, Dialogs, FileDialogOptions, HeadlessMenu, OutputFs,
    Updater,
};
use alva_backend::{Collaborators, Router, RouterSettings, Sender};
use alva_core::connections::{ConnectionStore, MemoryStore};
use alva_core::library::TypeScriptAnalyzer;
use alva_core::message::Envelope;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Dialogs answering with fixed selections and recording what was asked.
#[derive(Default)]
pub struct FakeDialogs {
    pub save: Option<PathBuf>,
    pub open: Vec<PathBuf>,
    pub directory: Option<PathBuf>,
    pub asked: Mutex<Vec<FileDialogOptions>>,
}

impl FakeDialogs {
    fn record(&self, options: FileDialogOptions) {
        self.asked.lock().unwrap().push(options);
    }
}

impl Dialogs for FakeDialogs {
    fn save_file(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>> {
        self.record(options);
        let path = self.save.clone();
        Box::pin(async move { path })
    }

    fn open_files(&self, options: FileDialogOptions) -> BoxFuture<'static, Vec<PathBuf>> {
        self.record(options);
        let paths = self.open.clone();
        Box::pin(async move { paths })
    }

    fn open_directory(&self, options: FileDialogOptions) -> BoxFuture<'static, Option<PathBuf>> {
        self.record(options);
        let path = self.directory.clone();
        Box::pin(async move { path })
    }
}

/// Pipeline returning a canned output, or failing when there is none.
#[derive(Default)]
pub struct FakePipeline {
    pub output: Option<OutputFs>,
    pub requests: Mutex<Vec<BuildRequest>>,
}

impl BuildPipeline for FakePipeline {
    fn build(&self, request: BuildRequest) -> BoxFuture<'static, Result<OutputFs, BuildError>> {
        self.requests.lock().unwrap().push(request);
        let output = self.output.clone();
        Box::pin(async move {
            output.ok_or_else(|| BuildError::Failed {
                status: "exit status: 1".into(),
                stderr: "bundler crashed".into(),
            })
        })
    }
}

#[derive(Default)]
pub struct CountingUpdater {
    pub checks: AtomicUsize,
}

impl Updater for CountingUpdater {
    fn check_for_updates(&self, _sender: Sender) {
        self.checks.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub router: Router,
    pub sender: Sender,
    pub ui: broadcast::Receiver<Envelope>,
    pub dialogs: Arc<FakeDialogs>,
    pub pipeline: Arc<FakePipeline>,
    pub menu: Arc<HeadlessMenu>,
    pub updater: Arc<CountingUpdater>,
    pub connections: ConnectionStore,
}

impl Harness {
    pub fn new(dialogs: FakeDialogs) -> Self {
        Self::with(dialogs, FakePipeline::default(), RouterSettings::default())
    }

    pub fn with(dialogs: FakeDialogs, pipeline: FakePipeline, settings: RouterSettings) -> Self {
        let sender = Sender::new(64);
        let ui = sender.subscribe();
        let dialogs = Arc::new(dialogs);
        let pipeline = Arc::new(pipeline);
        let menu = Arc::new(HeadlessMenu::default());
        let updater = Arc::new(CountingUpdater::default());
        let connections = ConnectionStore::new(Arc::new(MemoryStore::default()));
        let router = Router::new(
            sender.clone(),
            Collaborators {
                dialogs: dialogs.clone(),
                pipeline: pipeline.clone(),
                menu: menu.clone(),
                updater: updater.clone(),
                analyzer: Arc::new(TypeScriptAnalyzer),
                connections: connections.clone(),
            },
            settings,
        );
        Self {
            router,
            sender,
            ui,
            dialogs,
            pipeline,
            menu,
            updater,
            connections,
        }
    }

    /// Dispatches `envelope` and returns every reply it produced.
    pub async fn request(&mut self, envelope: Envelope) -> Vec<Envelope> {
        self.router.handle(envelope).await;
        let mut replies = Vec::new();
        while let Ok(reply) = self.ui.try_recv() {
            replies.push(reply);
        }
        replies
    }
}

/// A library folder with one pattern of two properties.
pub fn write_button_library(dir: &std::path::Path) {
    std::fs::write(
        dir.join("package.json"),
        r#"{ "name": "demo-components", "version": "1.2.0" }"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("button.d.ts"),
        r#"
/** A clickable button. */
export interface ButtonProps {
    /** Caption shown on the button. */
    text: string;
    disabled?: boolean;
}
"#,
    )
    .unwrap();
}
