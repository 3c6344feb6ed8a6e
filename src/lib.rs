//! Peer discovery and stream-link orchestration for nearby wireless devices.
//!
//! This crate turns a raw, possibly noisy device-discovery feed into a single
//! deduplicated, filtered, optionally auto-connected target, and manages the
//! resulting byte-stream connection: connect retries, read polling with
//! batched delivery, and one-shot writes.
//!
//! The platform pieces (discovery, the stream transport, and the bonding
//! store) are injected as trait objects ([`DiscoveryService`],
//! [`StreamTransport`], [`BondingStore`]), so the core works against any
//! radio stack and tests run against in-memory fakes.
//!
//! # Getting Started
//!
//! Construct a [`LinkController`] with your platform implementations and an
//! event handler, then drive it:
//!
//! ```ignore
//! use peerlink::{LinkController, LinkEvent, ScanRequest};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let controller = LinkController::new(
//!     Arc::new(MyDiscovery::new()),
//!     Arc::new(MyTransport::new()),
//!     Arc::new(MyBondingStore::new()),
//!     |event| match event {
//!         LinkEvent::Scanning(device) => println!("saw {device}"),
//!         LinkEvent::ConnectSucceeded => println!("connected"),
//!         LinkEvent::DataReceived(bytes) => println!("got {} bytes", bytes.len()),
//!         other => println!("{other:?}"),
//!     },
//! );
//!
//! // Find a device named "SCALE-01" within 5 seconds and connect to it.
//! controller.scan(
//!     ScanRequest::new()
//!         .with_names(["SCALE-01"])
//!         .with_timeout(Duration::from_secs(5))
//!         .auto_connect(true),
//! );
//!
//! // Later, once connected:
//! controller.start_read();
//! controller.write(vec![0x01, 0x02]);
//! ```
//!
//! # Concurrency model
//!
//! Every operation returns immediately and runs on its own worker thread; at
//! most one worker per kind (scan, connect, read, write) is active, and
//! starting a new operation of a kind interrupts and discards the previous
//! worker of that kind. Results are funneled through one dispatcher thread,
//! so the event handler never needs its own locking.
//!
//! # Event contract
//!
//! - `scan` delivers exactly one of `ScanStarted { success: false }` or the
//!   sequence `ScanStarted { success: true }`, zero or more `Scanning`, and
//!   one `ScanFinished { matched }`, optionally followed by the connect
//!   sequence when auto-connect applies.
//! - `connect` delivers `ConnectStarted` then one of `ConnectSucceeded` or
//!   `ConnectFailed`.
//! - `write` delivers `WriteFinished` (echoing the payload) or `WriteFailed`.
//! - `start_read` delivers zero or more `DataReceived` chunks, terminated by
//!   `ReadFailed` or by an explicit `stop_read` (which delivers nothing).

pub mod backend;
mod buffer;
mod connect;
pub mod controller;
mod error;
pub mod events;
mod io;
mod scanner;
pub mod types;
mod worker;

pub use backend::{BondingStore, DiscoveryEvent, DiscoveryService, PeerStream, StreamTransport};
pub use buffer::DISCOVERY_BUFFER_CAPACITY;
pub use controller::LinkController;
pub use error::{Error, FaultKind, Result};
pub use events::LinkEvent;
pub use types::{LinkConfig, PeerDevice, ReadPolicy, ScanRequest};
