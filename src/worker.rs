//! Cooperative worker threads with cancellation.
//!
//! Every long-running activity in this crate is a plain loop function that
//! takes a [`CancelToken`] and checks it between iterations. Replacing a
//! worker of the same kind cancels the old token first, so at most one
//! worker per kind is ever live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared cancellation flag for one worker.
#[derive(Clone, Default)]
pub(crate) struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the token was cancelled before the full duration
    /// elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while remaining > Duration::ZERO {
            if self.is_cancelled() {
                return true;
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        self.is_cancelled()
    }
}

/// Handle to a spawned worker thread.
///
/// Dropping the handle does not stop the worker; call
/// [`interrupt`](Self::interrupt) first when the work must not outlive its
/// replacement.
pub(crate) struct WorkerHandle {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Requests cooperative cancellation.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    /// Returns whether the worker thread is still running.
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Spawns a named worker thread running `body` with a fresh token.
pub(crate) fn spawn<F>(name: &str, body: F) -> WorkerHandle
where
    F: FnOnce(CancelToken) + Send + 'static,
{
    let token = CancelToken::new();
    let thread_token = token.clone();
    let handle = thread::Builder::new()
        .name(format!("peerlink-{name}"))
        .spawn(move || body(thread_token))
        .expect("spawning worker thread");

    WorkerHandle { token, handle }
}

/// Interrupts the previous worker in `slot`, if any, then spawns and
/// installs its replacement. The old worker is cancelled before the new one
/// starts, so no two same-kind workers run un-cancelled at once.
pub(crate) fn replace_with<F>(slot: &mut Option<WorkerHandle>, spawn_next: F)
where
    F: FnOnce() -> WorkerHandle,
{
    if let Some(previous) = slot.take() {
        previous.interrupt();
    }
    *slot = Some(spawn_next());
}
