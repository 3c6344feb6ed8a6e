//! The link controller: public entry point for scan, connect, and byte I/O.
//!
//! One controller instance owns every worker lifecycle, the single active
//! connection slot, and the event dispatcher. Collaborators are injected at
//! construction, so hosts wire in their platform stack and tests wire in
//! fakes.
//!
//! All operations return immediately; outcomes arrive through the event
//! handler passed at construction. See the crate docs for the full event
//! contract.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::backend::{BondingStore, DiscoveryService, StreamTransport};
use crate::buffer::DiscoveryBuffer;
use crate::connect::{run_connect, ConnectContext, SharedConnection};
use crate::error::Error;
use crate::events::{EventDispatcher, EventSender, LinkEvent};
use crate::io::{run_read, run_write};
use crate::scanner::{
    finish_scan, run_collector, run_listener, run_start_worker, MatchHandoff, ScanContext,
    ScanSession,
};
use crate::types::{LinkConfig, PeerDevice, ScanRequest};
use crate::worker::{self, WorkerHandle};

/// Controller for discovering, selecting, and talking to one nearby peer.
///
/// At most one scan session, one connect attempt, one read loop, and one
/// write is active at a time; starting a new operation of a kind interrupts
/// and discards the previous worker of that kind.
pub struct LinkController {
    inner: Arc<Inner>,
}

struct Inner {
    discovery: Arc<dyn DiscoveryService>,
    transport: Arc<dyn StreamTransport>,
    bonding: Arc<dyn BondingStore>,
    config: LinkConfig,
    events: EventSender,
    _dispatcher: EventDispatcher,
    connection: SharedConnection,
    scan: Mutex<ScanSlots>,
    io: Mutex<IoSlots>,
}

/// The three workers belonging to the current (or last) scan session.
#[derive(Default)]
struct ScanSlots {
    context: Option<Arc<ScanContext>>,
    start: Option<WorkerHandle>,
    listener: Option<WorkerHandle>,
    collector: Option<WorkerHandle>,
}

#[derive(Default)]
struct IoSlots {
    connect: Option<WorkerHandle>,
    read: Option<WorkerHandle>,
    write: Option<WorkerHandle>,
}

impl LinkController {
    /// Creates a controller with the default [`LinkConfig`].
    ///
    /// `on_event` is invoked from a dedicated dispatcher thread, one event
    /// at a time, in delivery order.
    pub fn new<F>(
        discovery: Arc<dyn DiscoveryService>,
        transport: Arc<dyn StreamTransport>,
        bonding: Arc<dyn BondingStore>,
        on_event: F,
    ) -> Self
    where
        F: FnMut(LinkEvent) + Send + 'static,
    {
        Self::with_config(discovery, transport, bonding, LinkConfig::default(), on_event)
    }

    /// Creates a controller with explicit tuning.
    pub fn with_config<F>(
        discovery: Arc<dyn DiscoveryService>,
        transport: Arc<dyn StreamTransport>,
        bonding: Arc<dyn BondingStore>,
        config: LinkConfig,
        on_event: F,
    ) -> Self
    where
        F: FnMut(LinkEvent) + Send + 'static,
    {
        let dispatcher = EventDispatcher::new(on_event);
        let events = dispatcher.sender();
        Self {
            inner: Arc::new(Inner {
                discovery,
                transport,
                bonding,
                config,
                events,
                _dispatcher: dispatcher,
                connection: Arc::new(Mutex::new(None)),
                scan: Mutex::new(ScanSlots::default()),
                io: Mutex::new(IoSlots::default()),
            }),
        }
    }

    /// Starts a scan session.
    ///
    /// Returns immediately. Delivers exactly one of `ScanStarted { success:
    /// false }` (rejected or failed to start) or `ScanStarted { success:
    /// true }` followed by `Scanning` sightings and a single `ScanFinished`,
    /// optionally followed by the connect sequence when auto-connect
    /// applies.
    pub fn scan(&self, request: ScanRequest) {
        Inner::scan(&self.inner, request);
    }

    /// Explicitly ends the current scan session, if one is in progress.
    pub fn cancel_scan(&self) {
        let context = self.inner.scan.lock().unwrap().context.clone();
        if let Some(context) = context {
            finish_scan(&context);
        }
    }

    /// Opens a connection to `device`, replacing any in-flight attempt.
    pub fn connect(&self, device: PeerDevice) {
        self.inner.spawn_connect(device);
    }

    /// Writes `payload` to the connected peer as a one-shot operation.
    pub fn write(&self, payload: Vec<u8>) {
        let connection = Arc::clone(&self.inner.connection);
        let events = self.inner.events.clone();
        let mut io = self.inner.io.lock().unwrap();
        worker::replace_with(&mut io.write, || {
            worker::spawn("write", move |token| {
                run_write(payload, connection, events.gated(token));
            })
        });
    }

    /// Starts the read polling loop, replacing any active loop.
    pub fn start_read(&self) {
        let connection = Arc::clone(&self.inner.connection);
        let events = self.inner.events.clone();
        let config = self.inner.config.clone();
        let mut io = self.inner.io.lock().unwrap();
        worker::replace_with(&mut io.read, || {
            worker::spawn("read", move |token| {
                run_read(connection, events, config, token);
            })
        });
    }

    /// Requests cooperative cancellation of the read loop.
    ///
    /// The loop observes the request between iterations; no terminal event
    /// is delivered for an explicit stop.
    pub fn stop_read(&self) {
        if let Some(read) = self.inner.io.lock().unwrap().read.take() {
            read.interrupt();
        }
    }

    /// Returns whether an established connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .unwrap()
            .as_ref()
            .map(|stream| stream.is_connected())
            .unwrap_or(false)
    }

    /// Tears down the connection: stops I/O workers, closes the stream, and
    /// clears the connection slot.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }
}

impl Drop for LinkController {
    fn drop(&mut self) {
        // Quiet teardown: interrupt everything, release the platform, close
        // the stream. No events are emitted for destruction.
        {
            let scan = self.inner.scan.lock().unwrap();
            for handle in [&scan.start, &scan.listener, &scan.collector] {
                if let Some(handle) = handle {
                    handle.interrupt();
                }
            }
        }
        self.inner.discovery.unsubscribe();
        if self.inner.discovery.is_discovering() {
            self.inner.discovery.cancel_discovery();
        }
        self.inner.disconnect();
    }
}

impl Inner {
    fn scan(self: &Arc<Self>, request: ScanRequest) {
        if !self.discovery.is_enabled() {
            log::error!("discovery adapter is not enabled");
            self.events.emit(LinkEvent::AdapterDisabled);
            self.events.emit(LinkEvent::ScanStarted { success: false });
            return;
        }

        let mut scan = self.scan.lock().unwrap();

        if scan
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.session.in_progress())
        {
            log::warn!("{}", Error::rejected("a scan is already in progress"));
            self.events.emit(LinkEvent::ScanStarted { success: false });
            return;
        }

        if request.auto_connect && !request.has_filter() {
            log::warn!(
                "{}",
                Error::rejected("auto-connect requires a name list or a target address")
            );
            self.events.emit(LinkEvent::ScanStarted { success: false });
            return;
        }

        // Fresh session and buffer for every scan: stale sightings from the
        // previous session can never leak in.
        let session = Arc::new(ScanSession::begin());
        let buffer = Arc::new(DiscoveryBuffer::new());

        let (feed_tx, feed_rx) = mpsc::channel();
        self.discovery.subscribe(feed_tx);

        let handoff = Arc::downgrade(self);
        let on_match: MatchHandoff = Arc::new(move |device| {
            if let Some(inner) = handoff.upgrade() {
                inner.spawn_connect(device);
            }
        });

        let context = Arc::new(ScanContext {
            session,
            buffer,
            discovery: Arc::clone(&self.discovery),
            events: self.events.clone(),
            request,
            config: self.config.clone(),
            on_match,
        });

        // Leftover workers belong to an already-concluded session; they are
        // interrupted before their replacements start.
        let start_ctx = Arc::clone(&context);
        worker::replace_with(&mut scan.start, || {
            worker::spawn("scan-start", move |token| run_start_worker(start_ctx, token))
        });

        let listener_ctx = Arc::clone(&context);
        worker::replace_with(&mut scan.listener, || {
            worker::spawn("scan-listener", move |token| {
                run_listener(listener_ctx, feed_rx, token)
            })
        });

        let collector_ctx = Arc::clone(&context);
        worker::replace_with(&mut scan.collector, || {
            worker::spawn("scan-collector", move |token| {
                run_collector(collector_ctx, token)
            })
        });

        scan.context = Some(context);
    }

    fn spawn_connect(&self, device: PeerDevice) {
        let context = ConnectContext {
            device,
            discovery: Arc::clone(&self.discovery),
            transport: Arc::clone(&self.transport),
            bonding: Arc::clone(&self.bonding),
            connection: Arc::clone(&self.connection),
            events: self.events.clone(),
            config: self.config.clone(),
        };
        let mut io = self.io.lock().unwrap();
        worker::replace_with(&mut io.connect, || {
            worker::spawn("connect", move |token| run_connect(context, token))
        });
    }

    fn disconnect(&self) {
        {
            let mut io = self.io.lock().unwrap();
            for handle in [io.read.take(), io.write.take(), io.connect.take()] {
                if let Some(handle) = handle {
                    handle.interrupt();
                }
            }
        }
        if let Some(mut stream) = self.connection.lock().unwrap().take() {
            if let Err(err) = stream.close() {
                log::warn!("closing connection failed: {err}");
            }
        }
    }
}
