//! Event delivery from worker threads to the caller.
//!
//! Every worker reports through one channel drained by a single dispatcher
//! thread, which invokes the caller's handler. The handler therefore never
//! runs concurrently with itself and needs no synchronization of its own.
//! Delivery order matches emission order per worker; events from independent
//! workers may interleave.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use crate::error::FaultKind;
use crate::types::PeerDevice;
use crate::worker::CancelToken;

/// State-transition events delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The discovery adapter is absent or powered off; nothing was started.
    AdapterDisabled,
    /// Outcome of asking the platform to start discovery. `success: false`
    /// also covers rejected scan requests.
    ScanStarted { success: bool },
    /// A not-previously-seen device was discovered during the session.
    Scanning(PeerDevice),
    /// The scan session ended. `matched` is true only when a filter
    /// criterion selected a target device.
    ScanFinished { matched: bool },
    /// A connect worker began an attempt.
    ConnectStarted,
    /// The connection is established and ready for read/write.
    ConnectSucceeded,
    /// The connect worker gave up (open failure or attempts exhausted).
    ConnectFailed,
    /// A coalesced chunk of bytes arrived from the peer.
    DataReceived(Vec<u8>),
    /// The read loop terminated on a fault.
    ReadFailed(FaultKind),
    /// A one-shot write completed; echoes the written bytes.
    WriteFinished(Vec<u8>),
    /// A one-shot write failed.
    WriteFailed(FaultKind),
}

/// Worker-side handle for emitting events.
///
/// A gated sender carries its worker's cancellation token and silently drops
/// emissions once the worker has been replaced, so an interrupted attempt
/// can never deliver a stale terminal event.
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: Sender<LinkEvent>,
    gate: Option<CancelToken>,
}

impl EventSender {
    /// Derives a sender gated on `token`.
    pub fn gated(&self, token: CancelToken) -> Self {
        Self {
            tx: self.tx.clone(),
            gate: Some(token),
        }
    }

    /// Emits an event unless the gate has been cancelled.
    pub fn emit(&self, event: LinkEvent) {
        if let Some(gate) = &self.gate {
            if gate.is_cancelled() {
                log::debug!("suppressing event from interrupted worker: {event:?}");
                return;
            }
        }
        // A send error just means the dispatcher is gone (controller dropped).
        let _ = self.tx.send(event);
    }
}

/// Owns the delivery channel and the dispatcher thread.
pub(crate) struct EventDispatcher {
    tx: Sender<LinkEvent>,
    _handle: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawns the dispatcher thread around the caller's handler.
    ///
    /// The thread exits once every [`EventSender`] clone has been dropped.
    pub fn new<F>(mut handler: F) -> Self
    where
        F: FnMut(LinkEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<LinkEvent>();
        let handle = thread::Builder::new()
            .name("peerlink-events".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    handler(event);
                }
            })
            .expect("spawning event dispatcher thread");

        Self { tx, _handle: handle }
    }

    /// Returns an ungated sender for the dispatcher's channel.
    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            gate: None,
        }
    }
}
