//! Collaborator traits for the platform services the controller drives.
//!
//! This module defines the seams between the orchestration core and the
//! platform: device discovery, stream transport, and the bonding store.
//! Hosts implement these against their radio stack; tests implement them
//! with in-memory fakes.

use std::sync::mpsc::Sender;

use crate::error::Result;
use crate::types::PeerDevice;

// =============================================================================
// Discovery
// =============================================================================

/// Notifications produced by an active discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A nearby device was detected. The same device may be reported more
    /// than once during a run; deduplication happens downstream.
    DeviceFound(PeerDevice),
    /// The platform ended the discovery run on its own.
    Finished,
}

/// Device discovery service.
///
/// Implementations wrap the platform's inquiry/advertising machinery. The
/// controller subscribes a channel sender before starting discovery and
/// unsubscribes when the scan session concludes; implementations must not
/// block on a slow or dropped sink.
pub trait DiscoveryService: Send + Sync + 'static {
    /// Returns whether the underlying adapter is present and powered on.
    fn is_enabled(&self) -> bool;

    /// Ask the platform to begin a discovery run.
    ///
    /// Returns `false` when the adapter is transiently busy; the caller
    /// retries with backoff.
    fn start_discovery(&self) -> bool;

    /// Ask the platform to abort the current discovery run, if any.
    fn cancel_discovery(&self);

    /// Returns whether a discovery run is currently active.
    fn is_discovering(&self) -> bool;

    /// Registers the sink that receives [`DiscoveryEvent`]s.
    ///
    /// At most one sink is active at a time; subscribing replaces any
    /// previous sink.
    fn subscribe(&self, sink: Sender<DiscoveryEvent>);

    /// Drops the active sink, if any.
    fn unsubscribe(&self);
}

// =============================================================================
// Stream transport
// =============================================================================

/// A duplex byte stream to a single peer.
///
/// Handles are created unconnected by [`StreamTransport::open`] and become
/// usable after a successful [`connect`](PeerStream::connect). All methods
/// are driven from the controller's worker threads; implementations only
/// need `Send`, not `Sync`.
pub trait PeerStream: Send {
    /// Attempt to establish the stream. May be called again after a failed
    /// attempt.
    fn connect(&mut self) -> Result<()>;

    /// Returns whether the stream is currently established.
    fn is_connected(&self) -> bool;

    /// Returns the number of bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize>;

    /// Reads up to `buf.len()` bytes, returning the count actually read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes the entire buffer.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Flushes buffered output to the peer.
    fn flush(&mut self) -> Result<()>;

    /// Closes the stream. Further I/O must fail.
    fn close(&mut self) -> Result<()>;
}

/// Factory for peer streams.
pub trait StreamTransport: Send + Sync + 'static {
    /// Creates an unconnected stream handle for the given device.
    ///
    /// Errors here are terminal for the connect operation; no retries are
    /// attempted at the open step.
    fn open(&self, device: &PeerDevice) -> Result<Box<dyn PeerStream>>;
}

// =============================================================================
// Bonding store
// =============================================================================

/// Persistent pairing records kept by the platform.
pub trait BondingStore: Send + Sync + 'static {
    /// Returns the devices the platform currently holds a bond for.
    fn bonded_devices(&self) -> Vec<PeerDevice>;

    /// Removes the pairing record for a device.
    ///
    /// Used as a recovery heuristic when connecting repeatedly fails;
    /// callers treat failures as best-effort and only log them.
    fn remove_bond(&self, device: &PeerDevice) -> Result<()>;
}
