//! Duplex bridge between the host bus and the UI channel.
//!
//! The host bus is a single-consumer queue drained by [`Sender::receive`];
//! the UI channel is a broadcast that every connected transport subscribes
//! to. Neither side buffers beyond its channel or retries delivery.

use alva_core::message::{Envelope, PreviewEnvelope};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SenderError {
    #[error("a receiver is already registered for the host bus")]
    AlreadyReceiving,
    #[error("host bus is closed")]
    Closed,
}

#[derive(Clone)]
pub struct Sender {
    inner: Arc<Inner>,
}

struct Inner {
    ui: broadcast::Sender<Envelope>,
    host: mpsc::UnboundedSender<Envelope>,
    host_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl Sender {
    /// `capacity` bounds how far a slow UI subscriber may lag behind.
    pub fn new(capacity: usize) -> Self {
        let (ui, _) = broadcast::channel(capacity.max(1));
        let (host, host_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                ui,
                host,
                host_rx: Mutex::new(Some(host_rx)),
            }),
        }
    }

    /// Delivers `envelope` to every current UI subscriber.
    pub fn send(&self, envelope: Envelope) {
        let tag = envelope.message.tag();
        match self.inner.ui.send(envelope) {
            Ok(receivers) => debug!(kind = tag, receivers, "sent to ui"),
            Err(_) => debug!(kind = tag, "no ui subscriber, message dropped"),
        }
    }

    /// Queues `envelope` on the host bus as if the UI had sent it.
    pub fn emit(&self, envelope: Envelope) -> Result<(), SenderError> {
        self.inner.host.send(envelope).map_err(|_| SenderError::Closed)
    }

    /// Stream of UI-bound envelopes, for transports.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.ui.subscribe()
    }

    /// Translates a preview event into the host vocabulary and sends it.
    pub fn relay_preview(&self, envelope: PreviewEnvelope) {
        self.send(envelope.into());
    }

    /// Registers the one consumer of the host bus.
    ///
    /// Envelopes are taken in receipt order; each handler future runs as
    /// its own task so a slow request does not hold up the next one. A
    /// panicking handler is logged and the loop keeps going.
    pub fn receive<F, Fut>(&self, handler: F) -> Result<JoinHandle<()>, SenderError>
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // The slot only ever holds the receiver, so a poisoned lock is still usable.
        let mut rx = self
            .inner
            .host_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SenderError::AlreadyReceiving)?;

        Ok(tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let id = envelope.id.clone();
                let tag = envelope.message.tag();
                let task = tokio::spawn(handler(envelope));
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        if e.is_panic() {
                            error!(%id, kind = tag, "message handler panicked");
                        } else {
                            warn!(%id, kind = tag, "message handler cancelled: {e}");
                        }
                    }
                });
            }
            debug!("host bus closed");
        }))
    }
}
