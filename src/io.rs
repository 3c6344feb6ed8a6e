//! Byte exchange over the established connection.
//!
//! The read worker is a cooperative polling loop: it checks how many bytes
//! can be read without blocking, batches them into an accumulator, and
//! flushes the accumulator to the caller once the stream goes quiet. The
//! write worker performs a single blocking write-and-flush.

use std::mem;

use crate::connect::SharedConnection;
use crate::error::{FaultKind, Result};
use crate::events::{EventSender, LinkEvent};
use crate::types::{LinkConfig, ReadPolicy};
use crate::worker::CancelToken;

/// Read loop: `Opening -> Polling -> Closed`.
///
/// Terminates with `ReadFailed` on a fault, or silently when cancelled via
/// `stop_read`. A fatal I/O error ends the loop; transient empty polls just
/// sleep for [`LinkConfig::read_poll_interval`].
pub(crate) fn run_read(
    connection: SharedConnection,
    events: EventSender,
    config: LinkConfig,
    token: CancelToken,
) {
    let events = events.gated(token.clone());

    // Opening: a live connection is required before polling starts.
    {
        let guard = connection.lock().unwrap();
        match guard.as_ref() {
            Some(stream) if stream.is_connected() => {}
            _ => {
                events.emit(LinkEvent::ReadFailed(FaultKind::Disconnected));
                return;
            }
        }
    }
    log::debug!("read loop polling");

    let mut pending: Vec<u8> = Vec::new();
    while !token.is_cancelled() {
        let outcome = {
            let mut guard = connection.lock().unwrap();
            match guard.as_mut() {
                Some(stream) => poll_once(stream.as_mut(), &mut pending, config.read_policy),
                None => {
                    // The connection was torn down underneath the loop.
                    events.emit(LinkEvent::ReadFailed(FaultKind::Disconnected));
                    return;
                }
            }
        };

        match outcome {
            // Got bytes: poll again immediately, the peer may be mid-burst.
            Ok(true) => {}
            Ok(false) => {
                if !pending.is_empty() {
                    events.emit(LinkEvent::DataReceived(mem::take(&mut pending)));
                }
                if token.sleep(config.read_poll_interval) {
                    break;
                }
            }
            Err(err) => {
                log::error!("read loop I/O failure: {err}");
                events.emit(LinkEvent::ReadFailed(FaultKind::Io));
                return;
            }
        }
    }
    log::debug!("read loop closed");
}

/// One poll iteration. Returns `Ok(true)` when bytes were consumed.
fn poll_once(
    stream: &mut dyn crate::backend::PeerStream,
    pending: &mut Vec<u8>,
    policy: ReadPolicy,
) -> Result<bool> {
    let available = stream.available()?;
    if available == 0 {
        return Ok(false);
    }

    let mut chunk = vec![0u8; available];
    let read = stream.read(&mut chunk)?;
    chunk.truncate(read);

    match policy {
        ReadPolicy::Append => pending.extend_from_slice(&chunk),
        ReadPolicy::Replace => *pending = chunk,
    }
    Ok(true)
}

/// One-shot write: a single blocking write of the whole buffer plus an
/// explicit flush. Success echoes the written bytes back to the caller.
pub(crate) fn run_write(payload: Vec<u8>, connection: SharedConnection, events: EventSender) {
    let mut guard = connection.lock().unwrap();
    let stream = match guard.as_mut() {
        Some(stream) if stream.is_connected() => stream,
        _ => {
            events.emit(LinkEvent::WriteFailed(FaultKind::Disconnected));
            return;
        }
    };

    match stream.write_all(&payload).and_then(|()| stream.flush()) {
        Ok(()) => {
            log::debug!("wrote {} byte(s)", payload.len());
            events.emit(LinkEvent::WriteFinished(payload));
        }
        Err(err) => {
            log::error!("write of {} byte(s) failed: {err}", payload.len());
            events.emit(LinkEvent::WriteFailed(FaultKind::Io));
        }
    }
}
