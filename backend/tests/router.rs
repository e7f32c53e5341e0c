mod common;

use alva_backend::collaborators::OutputFs;
use alva_backend::RouterSettings;
use alva_core::connections::Connection;
use alva_core::library::{IdKind, IdNamespace, PatternLibrary};
use alva_core::message::{
    CheckLibraryRequestPayload, ContentEncoding, Envelope, ExportPayload, LibraryRequestPayload,
    Message, MessageId, SavePayload,
};
use alva_core::persistence;
use alva_core::project::Project;
use common::{write_button_library, FakeDialogs, FakePipeline, Harness};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tempfile::tempdir;

fn request(id: &str, message: Message) -> Envelope {
    Envelope::reply(&MessageId::from(id), message)
}

fn assert_correlated(replies: &[Envelope], id: &str) {
    assert!(replies.iter().all(|r| r.id == MessageId::from(id)));
}

#[tokio::test]
async fn create_new_file_replies_with_empty_named_project() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Untitled Project.alva");
    let mut h = Harness::new(FakeDialogs {
        save: Some(path.clone()),
        ..FakeDialogs::default()
    });

    let replies = h.request(request("a", Message::CreateNewFileRequest)).await;

    assert_eq!(replies.len(), 1);
    assert_correlated(&replies, "a");
    match &replies[0].message {
        Message::CreateNewFileResponse(payload) => {
            assert_eq!(payload.path, path);
            assert_eq!(payload.contents.name, "Untitled Project");
            assert_eq!(payload.contents.document_tree, json!({ "pages": [] }));
            assert_eq!(payload.contents.pattern_library.count(IdKind::Pattern), 0);
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(path.exists());
    assert_eq!(h.router.last_path(), Some(path));
    let asked = h.dialogs.asked.lock().unwrap();
    assert_eq!(asked[0].default_name.as_deref(), Some("Untitled Project.alva"));
    assert_eq!(asked[0].filters[0].extensions, ["alva"]);
}

#[tokio::test]
async fn create_new_file_reports_write_failure() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "").unwrap();
    let mut h = Harness::new(FakeDialogs {
        save: Some(blocker.join("nested.alva")),
        ..FakeDialogs::default()
    });

    let replies = h.request(request("a2", Message::CreateNewFileRequest)).await;

    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0].message, Message::CreateNewFileError(_)));
    assert!(h.router.last_path().is_none());
}

#[tokio::test]
async fn cancelled_dialogs_never_reply() {
    let mut h = Harness::new(FakeDialogs::default());
    for message in [
        Message::CreateNewFileRequest,
        Message::OpenFileRequest,
        Message::AssetReadRequest,
        Message::ConnectPatternLibraryRequest(LibraryRequestPayload {
            library: PatternLibrary::new("lib"),
        }),
    ] {
        assert!(h.request(request("b", message)).await.is_empty());
    }
}

#[tokio::test]
async fn open_file_replies_with_project_and_remembers_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Demo.alva");
    let project = Project::create(&path);
    persistence::persist(&path, &project).await.unwrap();
    let mut h = Harness::new(FakeDialogs {
        open: vec![path.clone()],
        ..FakeDialogs::default()
    });

    let replies = h.request(request("o", Message::OpenFileRequest)).await;

    assert_eq!(replies.len(), 1);
    match &replies[0].message {
        Message::OpenFileResponse(payload) => {
            assert_eq!(payload.path, path);
            assert_eq!(payload.contents.id, project.id);
            assert_eq!(payload.contents.path.as_deref(), Some(path.as_path()));
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert_eq!(h.router.last_path(), Some(path));
}

#[tokio::test]
async fn open_file_reports_unreadable_document() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.alva");
    std::fs::write(&path, "{ nope").unwrap();
    let mut h = Harness::new(FakeDialogs {
        open: vec![path.clone()],
        ..FakeDialogs::default()
    });

    let replies = h.request(request("o2", Message::OpenFileRequest)).await;

    assert_eq!(replies.len(), 1);
    assert_correlated(&replies, "o2");
    match &replies[0].message {
        Message::OpenFileError(err) => assert_eq!(err.path.as_deref(), Some(path.as_path())),
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(h.router.last_path().is_none());
}

#[tokio::test]
async fn app_loaded_announces_port() {
    let mut h = Harness::with(
        FakeDialogs::default(),
        FakePipeline::default(),
        RouterSettings {
            port: 4321,
            dev_mode: false,
        },
    );
    let replies = h.request(request("l", Message::AppLoaded)).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(
        serde_json::to_value(&replies[0]).unwrap(),
        json!({ "id": "l", "type": "start-app", "payload": { "port": 4321 } })
    );
}

#[tokio::test]
async fn app_loaded_in_dev_mode_reopens_last_saved_project() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Dev.alva");
    let mut h = Harness::with(
        FakeDialogs::default(),
        FakePipeline::default(),
        RouterSettings {
            port: 1,
            dev_mode: true,
        },
    );
    let project = Project::create(&path);
    let saved = h
        .request(request(
            "s",
            Message::Save(SavePayload {
                path: path.clone(),
                project: project.clone(),
            }),
        ))
        .await;
    assert!(saved.is_empty());

    let replies = h.request(request("l", Message::AppLoaded)).await;
    let tags: Vec<_> = replies.iter().map(|r| r.message.tag()).collect();
    assert_eq!(tags, ["open-file-response", "start-app"]);
    assert_correlated(&replies, "l");

    h.request(request("c", Message::ProjectClosed)).await;
    assert!(h.router.last_path().is_none());
    let replies = h.request(request("l2", Message::AppLoaded)).await;
    assert_eq!(replies.len(), 1);
}

#[tokio::test]
async fn save_writes_project_without_path_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Saved.alva");
    let mut h = Harness::new(FakeDialogs::default());
    let replies = h
        .request(request(
            "s",
            Message::Save(SavePayload {
                path: path.clone(),
                project: Project::create(&path),
            }),
        ))
        .await;
    assert!(replies.is_empty());
    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored["name"], "Saved");
    assert!(stored.get("path").is_none());
    assert_eq!(h.router.last_path(), Some(path));
}

#[tokio::test]
async fn asset_read_replies_with_data_uri() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pixel.png");
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nxyz").unwrap();
    let mut h = Harness::new(FakeDialogs {
        open: vec![path],
        ..FakeDialogs::default()
    });
    let replies = h.request(request("asset", Message::AssetReadRequest)).await;
    match &replies[..] {
        [reply] => match &reply.message {
            Message::AssetReadResponse(uri) => assert!(uri.starts_with("data:image/png;base64,")),
            other => panic!("unexpected reply {other:?}"),
        },
        other => panic!("expected one reply, got {other:?}"),
    }
}

#[tokio::test]
async fn asset_read_reports_missing_file() {
    let dir = tempdir().unwrap();
    let mut h = Harness::new(FakeDialogs {
        open: vec![dir.path().join("gone.png")],
        ..FakeDialogs::default()
    });
    let replies = h.request(request("asset", Message::AssetReadRequest)).await;
    assert_eq!(replies.len(), 1);
    assert!(matches!(replies[0].message, Message::AssetReadError(_)));
}

#[tokio::test]
async fn exports_decode_content_and_stay_silent() {
    let dir = tempdir().unwrap();
    let html = dir.path().join("page.html");
    let png = dir.path().join("page.png");
    let mut h = Harness::new(FakeDialogs::default());

    let replies = h
        .request(request(
            "e1",
            Message::ExportHtml(ExportPayload {
                path: html.clone(),
                content: "<h1>Hi</h1>".into(),
                encoding: ContentEncoding::Utf8,
            }),
        ))
        .await;
    assert!(replies.is_empty());
    let replies = h
        .request(request(
            "e2",
            Message::ExportPng(ExportPayload {
                path: png.clone(),
                content: "AAEC".into(),
                encoding: ContentEncoding::Base64,
            }),
        ))
        .await;
    assert!(replies.is_empty());

    assert_eq!(std::fs::read_to_string(html).unwrap(), "<h1>Hi</h1>");
    assert_eq!(std::fs::read(png).unwrap(), [0u8, 1, 2]);
}

#[tokio::test]
async fn script_bundle_replies_with_both_artifacts() {
    let mut output = OutputFs::default();
    output.insert("/renderer.js", "render()");
    output.insert("/preview.js", "preview()");
    let mut h = Harness::with(
        FakeDialogs::default(),
        FakePipeline {
            output: Some(output),
            ..FakePipeline::default()
        },
        RouterSettings::default(),
    );

    let replies = h.request(request("bundle", Message::CreateScriptBundleRequest)).await;

    assert_eq!(
        serde_json::to_value(&replies).unwrap(),
        json!([{
            "id": "bundle",
            "type": "create-script-bundle-response",
            "payload": [
                { "name": "renderer", "path": "/renderer.js", "contents": "render()" },
                { "name": "preview", "path": "/preview.js", "contents": "preview()" }
            ]
        }])
    );
    let requests = h.pipeline.requests.lock().unwrap();
    assert!(requests[0].infrastructure);
    assert!(requests[0].entries.is_empty());
}

#[tokio::test]
async fn script_bundle_failures_reply_with_error() {
    let mut h = Harness::new(FakeDialogs::default());
    let replies = h.request(request("b1", Message::CreateScriptBundleRequest)).await;
    assert_eq!(replies.len(), 1);
    match &replies[0].message {
        Message::CreateScriptBundleError(err) => assert!(err.message.contains("bundler crashed")),
        other => panic!("unexpected reply {other:?}"),
    }

    let mut output = OutputFs::default();
    output.insert("/renderer.js", "render()");
    let mut h = Harness::with(
        FakeDialogs::default(),
        FakePipeline {
            output: Some(output),
            ..FakePipeline::default()
        },
        RouterSettings::default(),
    );
    let replies = h.request(request("b2", Message::CreateScriptBundleRequest)).await;
    assert_eq!(replies.len(), 1);
    match &replies[0].message {
        Message::CreateScriptBundleError(err) => {
            assert_eq!(err.path.as_deref(), Some(std::path::Path::new("/preview.js")))
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[tokio::test]
async fn connect_pattern_library_allocates_fresh_ids() {
    let dir = tempdir().unwrap();
    write_button_library(dir.path());
    let mut h = Harness::new(FakeDialogs {
        directory: Some(dir.path().to_path_buf()),
        ..FakeDialogs::default()
    });
    let library = PatternLibrary::new("demo");

    let replies = h
        .request(request(
            "c",
            Message::ConnectPatternLibraryRequest(LibraryRequestPayload {
                library: library.clone(),
            }),
        ))
        .await;

    assert_eq!(replies.len(), 1);
    assert_correlated(&replies, "c");
    let Message::ConnectPatternLibraryResponse(payload) = &replies[0].message else {
        panic!("unexpected reply {:?}", replies[0].message);
    };
    assert_eq!(payload.analysis.name, "demo-components");
    assert_eq!(payload.analysis.patterns.len(), 1);
    let button = &payload.analysis.patterns[0];
    assert_eq!(button.properties.len(), 2);

    let updated = &payload.library;
    assert_eq!(updated.id, library.id);
    assert_eq!(updated.count(IdKind::Pattern), 1);
    assert_eq!(updated.count(IdKind::Property), 2);
    assert_eq!(
        updated.global_id(IdNamespace::Pattern, &button.context_id),
        Some(button.id.as_str())
    );
    assert!(library
        .global_id(IdNamespace::Pattern, &button.context_id)
        .is_none());
    assert_ne!(button.properties[0].id, button.properties[1].id);
}

#[tokio::test]
async fn connect_rejects_corrupted_library() {
    let dir = tempdir().unwrap();
    write_button_library(dir.path());
    let mut h = Harness::new(FakeDialogs {
        directory: Some(dir.path().to_path_buf()),
        ..FakeDialogs::default()
    });
    let corrupted: PatternLibrary = serde_json::from_value(json!({
        "id": "lib",
        "patternIds": { "a.d.ts:A": "same", "b.d.ts:B": "same" }
    }))
    .unwrap();

    let replies = h
        .request(request(
            "bad",
            Message::ConnectPatternLibraryRequest(LibraryRequestPayload { library: corrupted }),
        ))
        .await;

    assert_eq!(replies.len(), 1);
    assert!(matches!(
        replies[0].message,
        Message::ConnectPatternLibraryError(_)
    ));
}

#[tokio::test]
async fn connect_reports_missing_folder() {
    let dir = tempdir().unwrap();
    let mut h = Harness::new(FakeDialogs {
        directory: Some(dir.path().join("absent")),
        ..FakeDialogs::default()
    });
    let replies = h
        .request(request(
            "m",
            Message::ConnectPatternLibraryRequest(LibraryRequestPayload {
                library: PatternLibrary::new("lib"),
            }),
        ))
        .await;
    assert!(matches!(
        replies[..],
        [Envelope {
            message: Message::ConnectPatternLibraryError(_),
            ..
        }]
    ));
}

#[tokio::test]
async fn update_without_connection_is_silent() {
    let mut h = Harness::new(FakeDialogs::default());
    let replies = h
        .request(request(
            "d",
            Message::UpdatePatternLibraryRequest(LibraryRequestPayload {
                library: PatternLibrary::new("never-connected"),
            }),
        ))
        .await;
    assert!(replies.is_empty());
}

#[tokio::test]
async fn update_reuses_ids_from_previous_analysis() {
    let dir = tempdir().unwrap();
    write_button_library(dir.path());
    let mut h = Harness::new(FakeDialogs {
        directory: Some(dir.path().to_path_buf()),
        ..FakeDialogs::default()
    });
    let library = PatternLibrary::new("demo");

    let first = h
        .request(request(
            "c",
            Message::ConnectPatternLibraryRequest(LibraryRequestPayload { library }),
        ))
        .await;
    let Message::ConnectPatternLibraryResponse(first) = &first[0].message else {
        panic!("connect failed");
    };
    h.request(request(
        "n",
        Message::ConnectedPatternLibraryNotification(Connection::new(
            first.library.id.clone(),
            dir.path(),
        )),
    ))
    .await;

    let second = h
        .request(request(
            "u",
            Message::UpdatePatternLibraryRequest(LibraryRequestPayload {
                library: first.library.clone(),
            }),
        ))
        .await;
    assert_eq!(second.len(), 1);
    assert_correlated(&second, "u");
    let Message::ConnectPatternLibraryResponse(second) = &second[0].message else {
        panic!("update failed");
    };
    assert_eq!(second.analysis, first.analysis);
    assert_eq!(second.library, first.library);
}

#[tokio::test]
async fn connection_notifications_are_deduplicated() {
    let mut h = Harness::new(FakeDialogs::default());
    for id in ["n1", "n2"] {
        let replies = h
            .request(request(
                id,
                Message::ConnectedPatternLibraryNotification(Connection::new("lib", "/libs/a")),
            ))
            .await;
        assert!(replies.is_empty());
    }
    assert_eq!(h.connections.list(), vec![Connection::new("lib", "/libs/a")]);
}

#[tokio::test]
async fn check_library_replies_once_per_connection() {
    let dir = tempdir().unwrap();
    let present = dir.path().to_path_buf();
    let absent = dir.path().join("moved-away");
    let mut h = Harness::new(FakeDialogs::default());
    h.connections
        .upsert(Connection::new("lib", present.clone()))
        .unwrap();
    h.connections
        .upsert(Connection::new("lib", absent.clone()))
        .unwrap();
    h.connections
        .upsert(Connection::new("other", present.clone()))
        .unwrap();

    let replies = h
        .request(request(
            "e",
            Message::CheckLibraryRequest(CheckLibraryRequestPayload { id: "lib".into() }),
        ))
        .await;

    assert_eq!(replies.len(), 2);
    assert_correlated(&replies, "e");
    let mut checks: Vec<(PathBuf, bool)> = replies
        .into_iter()
        .flat_map(|r| match r.message {
            Message::CheckLibraryResponse(checks) => checks,
            other => panic!("unexpected reply {other:?}"),
        })
        .map(|c| (c.path, c.connected))
        .collect();
    checks.sort();
    let mut expected = vec![(present, true), (absent, false)];
    expected.sort();
    assert_eq!(checks, expected);
}

#[tokio::test]
async fn menus_and_updates_go_to_collaborators() {
    let mut h = Harness::new(FakeDialogs::default());
    let menu = json!({ "items": [{ "label": "File" }] });
    assert!(h
        .request(request("m", Message::UpdateMenu(menu.clone())))
        .await
        .is_empty());
    assert!(h
        .request(request(
            "x",
            Message::ContextElementMenuRequest(json!({ "id": "el" }))
        ))
        .await
        .is_empty());
    assert!(h
        .request(request("u", Message::CheckForUpdatesRequest))
        .await
        .is_empty());

    assert_eq!(h.menu.last_menu(), Some(menu));
    assert_eq!(h.menu.last_context(), Some(json!({ "id": "el" })));
    assert_eq!(h.updater.checks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn listening_router_answers_emitted_requests() {
    let h = Harness::with(
        FakeDialogs::default(),
        FakePipeline::default(),
        RouterSettings {
            port: 9,
            dev_mode: false,
        },
    );
    let mut ui = h.sender.subscribe();
    h.router.clone().listen().unwrap();
    h.sender
        .emit(request("via-bus", Message::AppLoaded))
        .unwrap();
    let reply = tokio::time::timeout(std::time::Duration::from_secs(1), ui.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.id, MessageId::from("via-bus"));
    assert!(matches!(reply.message, Message::StartApp(_)));
}
