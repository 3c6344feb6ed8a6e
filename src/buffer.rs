//! Bounded buffer between the discovery listener and the collector.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

use crate::types::PeerDevice;

/// Maximum number of raw discovery events held at once. Events beyond the
/// bound are dropped, never blocked on.
pub const DISCOVERY_BUFFER_CAPACITY: usize = 1000;

/// Bounded FIFO of raw discovered-device events.
///
/// The listener thread enqueues, the collector thread drains. The queue
/// itself is lock-free; the mutex/condvar pair only backs the collector's
/// park-when-empty wait.
pub(crate) struct DiscoveryBuffer {
    queue: ArrayQueue<PeerDevice>,
    signal: Mutex<()>,
    available: Condvar,
}

impl DiscoveryBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DISCOVERY_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            signal: Mutex::new(()),
            available: Condvar::new(),
        }
    }

    /// Enqueues a device and wakes the collector.
    ///
    /// Returns `false` when the buffer is full and the device was dropped.
    pub fn push(&self, device: PeerDevice) -> bool {
        if let Err(dropped) = self.queue.push(device) {
            log::debug!("discovery buffer full, dropping {}", dropped.address);
            return false;
        }
        self.notify();
        true
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<PeerDevice> {
        self.queue.pop()
    }

    /// Discards everything currently buffered.
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Parks the caller until a new item is signaled or `timeout` elapses.
    ///
    /// Callers re-check their exit conditions after returning; wakeups may
    /// be spurious.
    pub fn wait(&self, timeout: Duration) {
        let guard = self.signal.lock().unwrap();
        if self.queue.is_empty() {
            let _unused = self.available.wait_timeout(guard, timeout).unwrap();
        }
    }

    /// Wakes any parked consumer, e.g. when the session ends.
    pub fn notify(&self) {
        let _guard = self.signal.lock().unwrap();
        self.available.notify_all();
    }
}
