//! Connect worker: opens a stream to a target device with bounded retries.

use std::sync::{Arc, Mutex};

use crate::backend::{BondingStore, DiscoveryService, PeerStream, StreamTransport};
use crate::error::Error;
use crate::events::{EventSender, LinkEvent};
use crate::types::{LinkConfig, PeerDevice};
use crate::worker::CancelToken;

/// The single active connection slot, owned by the controller.
///
/// The connect worker writes a fully-established stream exactly once on
/// success; readers either observe that stream or `None`, never a partial
/// handle.
pub(crate) type SharedConnection = Arc<Mutex<Option<Box<dyn PeerStream>>>>;

pub(crate) struct ConnectContext {
    pub device: PeerDevice,
    pub discovery: Arc<dyn DiscoveryService>,
    pub transport: Arc<dyn StreamTransport>,
    pub bonding: Arc<dyn BondingStore>,
    pub connection: SharedConnection,
    pub events: EventSender,
    pub config: LinkConfig,
}

/// Runs one connect attempt sequence to completion.
///
/// Emits `ConnectStarted`, then exactly one of `ConnectSucceeded` or
/// `ConnectFailed`. An interrupt suppresses the terminal event via the
/// gated sender.
pub(crate) fn run_connect(ctx: ConnectContext, token: CancelToken) {
    let events = ctx.events.gated(token.clone());
    events.emit(LinkEvent::ConnectStarted);

    // Open failures are terminal; retries only apply to connect attempts.
    let mut stream = match ctx.transport.open(&ctx.device) {
        Ok(stream) => stream,
        Err(err) => {
            log::error!("opening stream to {} failed: {err}", ctx.device);
            events.emit(LinkEvent::ConnectFailed);
            return;
        }
    };

    // Discovery and connection attempts are mutually exclusive on most
    // radio stacks.
    if ctx.discovery.is_discovering() {
        ctx.discovery.cancel_discovery();
    }

    let mut attempt = 0;
    while !stream.is_connected() && attempt < ctx.config.connect_attempts {
        attempt += 1;
        match stream.connect() {
            Ok(()) => {
                // Give the stream a moment to settle before trusting
                // is_connected.
                if token.sleep(ctx.config.connect_settle) {
                    return;
                }
            }
            Err(err) => {
                log::error!("connect attempt {attempt} to {} failed: {err}", ctx.device);
            }
        }
        if token.is_cancelled() {
            return;
        }
    }

    if !stream.is_connected() {
        log::error!("{} to {}", Error::ConnectFailed { attempts: attempt }, ctx.device);
        remove_stale_bond(&ctx);
        events.emit(LinkEvent::ConnectFailed);
        return;
    }

    *ctx.connection.lock().unwrap() = Some(stream);
    log::debug!("connected to {}", ctx.device);
    events.emit(LinkEvent::ConnectSucceeded);
}

/// Recovery heuristic for a stuck pairing state: when every attempt failed
/// and the target is still bonded, drop the bond so the next attempt starts
/// from a clean pairing.
fn remove_stale_bond(ctx: &ConnectContext) {
    for bonded in ctx.bonding.bonded_devices() {
        if bonded.address == ctx.device.address {
            if let Err(err) = ctx.bonding.remove_bond(&bonded) {
                log::warn!("removing bond for {} failed: {err}", ctx.device);
            } else {
                log::debug!("removed stale bond for {}", ctx.device);
            }
        }
    }
}
