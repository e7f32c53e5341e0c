use crate::collaborators::{DisabledUpdater, HeadlessMenu};
use crate::config::HostConfig;
use crate::dialogs::NativeDialogs;
use crate::pipeline::CommandBuildPipeline;
use crate::router::{Collaborators, Router, RouterSettings};
use crate::sender::Sender;
use alva_core::connections::{ConnectionStore, JsonFileStore};
use alva_core::library::TypeScriptAnalyzer;
use alva_core::message::{Envelope, PreviewEnvelope};
use axum::extract::ws::Message;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::{
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    signal,
    sync::broadcast::{self, error::RecvError},
    time,
};
use tracing::{debug, error, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    sender: Sender,
    token: Option<String>,
    max_connections: usize,
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(sender: Sender, cfg: &HostConfig) -> Self {
        Self {
            sender,
            token: cfg.token.clone().filter(|t| !t.is_empty()),
            max_connections: cfg.max_connections,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Which process is on the other end of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peer {
    Ui,
    Preview,
}

fn check_connection_limit(connections: &Arc<AtomicUsize>, max: usize) -> Result<(), StatusCode> {
    let current = connections.fetch_add(1, Ordering::SeqCst);
    if current >= max {
        connections.fetch_sub(1, Ordering::SeqCst);
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Accepts `Authorization: Bearer <token>` or `?token=<token>`.
fn auth(expected: Option<&str>, headers: &HeaderMap, query: &TokenQuery) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    bearer.or(query.token.as_deref()) == Some(expected)
}

pub async fn ws_handler(
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    if !auth(state.token.as_deref(), &headers, &query) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    check_connection_limit(&state.connections, state.max_connections)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Peer::Ui)))
}

pub async fn preview_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    check_connection_limit(&state.connections, state.max_connections)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, Peer::Preview)))
}

fn dispatch(sender: &Sender, peer: Peer, text: &str) {
    match peer {
        Peer::Ui => match Envelope::parse(text) {
            Ok(envelope) => {
                if let Err(e) = sender.emit(envelope) {
                    error!("failed to queue message: {e}");
                }
            }
            Err(e) => warn!("dropping malformed envelope: {e}"),
        },
        Peer::Preview => match PreviewEnvelope::parse(text) {
            Ok(envelope) => sender.relay_preview(envelope),
            Err(e) => warn!("dropping malformed preview event: {e}"),
        },
    }
}

/// Next UI-bound envelope, or never for peers that only talk to the host.
async fn next_outbound(
    rx: &mut Option<broadcast::Receiver<Envelope>>,
) -> Result<Envelope, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: Peer) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = (peer == Peer::Ui).then(|| state.sender.subscribe());
    let awaiting_pong = Arc::new(AtomicBool::new(false));
    let pong_flag = awaiting_pong.clone();
    let sender = state.sender.clone();
    debug!(?peer, "socket connected");

    let mut incoming = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => dispatch(&sender, peer, &text),
                Ok(Message::Pong(_)) => pong_flag.store(false, Ordering::SeqCst),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("websocket receive error: {e}");
                    break;
                }
            }
        }
    });

    let mut interval = time::interval(PING_INTERVAL);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = &mut incoming => break,
            _ = interval.tick() => {
                if awaiting_pong.swap(true, Ordering::SeqCst) {
                    match time::timeout(IO_TIMEOUT, sink.send(Message::Close(None))).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!("failed to send close frame: {e}"),
                        Err(e) => error!("timeout sending close frame: {e}"),
                    }
                    break;
                }
                match time::timeout(IO_TIMEOUT, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        error!("failed to send ping: {e}");
                        break;
                    }
                    Err(e) => {
                        error!("timeout sending ping: {e}");
                        break;
                    }
                }
            }
            msg = next_outbound(&mut rx) => {
                let envelope = match msg {
                    Ok(envelope) => envelope,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "ui socket lagging, messages dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let text = match envelope.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!(id = %envelope.id, "failed to encode envelope: {e}");
                        continue;
                    }
                };
                match time::timeout(IO_TIMEOUT, sink.send(Message::Text(text))).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        error!("failed to send text message: {e}");
                        break;
                    }
                    Err(e) => {
                        error!("timeout sending text message: {e}");
                        break;
                    }
                }
            }
        }
    }

    incoming.abort();
    state.connections.fetch_sub(1, Ordering::SeqCst);
    debug!(?peer, "socket closed");
}

/// Routes of the transport: `/ws` for the UI, `/preview` for the preview
/// process.
pub fn app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(ws_handler))
        .route("/preview", get(preview_handler))
        .with_state(state)
}

/// Default collaborators of a desktop host.
pub fn default_collaborators(
    cfg: &HostConfig,
) -> Result<Collaborators, Box<dyn std::error::Error + Send + Sync>> {
    let store = match &cfg.store_path {
        Some(path) => JsonFileStore::open(path),
        None => JsonFileStore::user_scoped().map_err(|e| {
            error!("open connection store: {e}");
            e
        })?,
    };
    info!(path = %store.path().display(), "using connection store");
    Ok(Collaborators {
        dialogs: Arc::new(NativeDialogs),
        pipeline: Arc::new(CommandBuildPipeline::new(cfg.build_command.clone())),
        menu: Arc::new(HeadlessMenu::default()),
        updater: Arc::new(DisabledUpdater),
        analyzer: Arc::new(TypeScriptAnalyzer),
        connections: ConnectionStore::new(Arc::new(store)),
    })
}

pub async fn run(cfg: HostConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port)).map_err(|e| {
        error!("bind {}:{}: {e}", cfg.host, cfg.port);
        e
    })?;
    listener.set_nonblocking(true)?;
    let addr: SocketAddr = listener.local_addr()?;

    let sender = Sender::new(cfg.channel_capacity);
    let router = Router::new(
        sender.clone(),
        default_collaborators(&cfg)?,
        RouterSettings {
            port: addr.port(),
            dev_mode: cfg.dev_mode,
        },
    );
    let _dispatch = router.listen()?;

    let app = app(AppState::new(sender, &cfg));
    info!("Listening on {}", addr);
    let ctrl_c = signal::ctrl_c();
    axum::Server::from_tcp(listener)
        .map_err(|e| {
            error!("server error: {e}");
            e
        })?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(e) = ctrl_c.await {
                error!("failed to listen for shutdown signal: {e}");
            }
        })
        .await
        .map_err(|e| {
            error!("server error: {e}");
            e
        })?;
    Ok(())
}
