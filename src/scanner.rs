//! Scan session state and the three scan-kind workers.
//!
//! A scan runs three cooperating threads:
//!
//! - the **start worker** asks the platform to begin discovery (retrying
//!   while the adapter is busy, bounded by a start-timeout guard) and arms
//!   the optional finish timer,
//! - the **listener** drains the platform's discovery feed into the bounded
//!   buffer,
//! - the **collector** dedups buffered devices, reports each new sighting,
//!   and evaluates the request's match criteria.
//!
//! All paths that can end a session funnel through [`finish_scan`], which
//! uses a compare-and-swap on the session flag so conclusion happens exactly
//! once no matter which worker gets there first.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::backend::{DiscoveryEvent, DiscoveryService};
use crate::buffer::DiscoveryBuffer;
use crate::error::Error;
use crate::events::{EventSender, LinkEvent};
use crate::types::{LinkConfig, PeerDevice, ScanRequest};
use crate::worker::CancelToken;

/// How long blocked waits last before re-checking exit conditions.
const PARK_INTERVAL: Duration = Duration::from_millis(50);

/// Invoked with the matched device when an auto-connect request concludes
/// with a target.
pub(crate) type MatchHandoff = Arc<dyn Fn(PeerDevice) + Send + Sync>;

// =============================================================================
// Scan session
// =============================================================================

/// Mutable state owned by one scan, shared across its workers.
///
/// A fresh session is created at scan start; the previous session object is
/// discarded at that moment, so stale sightings can never leak into a new
/// scan. The `in_progress` flag is the single scan-in-flight gate.
pub(crate) struct ScanSession {
    in_progress: AtomicBool,
    seen: Mutex<HashSet<String>>,
    matched: Mutex<Option<PeerDevice>>,
}

impl ScanSession {
    /// Creates a session already marked in progress.
    pub fn begin() -> Self {
        Self {
            in_progress: AtomicBool::new(true),
            seen: Mutex::new(HashSet::new()),
            matched: Mutex::new(None),
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Flips the session out of `in_progress`. Returns true for the single
    /// caller that performed the transition.
    fn conclude(&self) -> bool {
        self.in_progress.swap(false, Ordering::SeqCst)
    }

    /// Records the first sighting of a device. Returns false when the
    /// address was already seen this session.
    fn first_sighting(&self, device: &PeerDevice) -> bool {
        self.seen.lock().unwrap().insert(device.address.clone())
    }

    /// Stores the matched target unless one is already set. Returns true
    /// when this device became the target.
    fn record_match(&self, device: PeerDevice) -> bool {
        let mut matched = self.matched.lock().unwrap();
        if matched.is_some() {
            return false;
        }
        *matched = Some(device);
        true
    }

    pub fn matched(&self) -> Option<PeerDevice> {
        self.matched.lock().unwrap().clone()
    }
}

/// Everything a scan worker needs, bundled for cheap sharing.
pub(crate) struct ScanContext {
    pub session: Arc<ScanSession>,
    pub buffer: Arc<DiscoveryBuffer>,
    pub discovery: Arc<dyn DiscoveryService>,
    pub events: EventSender,
    pub request: ScanRequest,
    pub config: LinkConfig,
    pub on_match: MatchHandoff,
}

// =============================================================================
// Session conclusion
// =============================================================================

/// Ends the session: stops discovery, wakes the collector, reports the
/// outcome, and hands a matched target to the connect path when requested.
///
/// Safe to call from any worker or from the controller; only the first
/// caller acts.
pub(crate) fn finish_scan(ctx: &ScanContext) {
    if !ctx.session.conclude() {
        return;
    }

    stop_discovery(ctx);

    let matched = ctx.session.matched();
    let found = ctx.request.has_filter() && matched.is_some();
    ctx.events.emit(LinkEvent::ScanFinished { matched: found });

    if ctx.request.auto_connect {
        if let Some(device) = matched {
            (ctx.on_match)(device);
        }
    }
}

/// Ends the session because discovery never started. Reports the start
/// failure instead of a finished event.
fn abort_start(ctx: &ScanContext) {
    if !ctx.session.conclude() {
        return;
    }
    stop_discovery(ctx);
    ctx.events.emit(LinkEvent::ScanStarted { success: false });
}

fn stop_discovery(ctx: &ScanContext) {
    if ctx.discovery.is_discovering() {
        ctx.discovery.cancel_discovery();
    }
    ctx.discovery.unsubscribe();
    ctx.buffer.notify();
}

// =============================================================================
// Workers
// =============================================================================

/// Start worker: bounded retry of `start_discovery`, then the finish timer.
pub(crate) fn run_start_worker(ctx: Arc<ScanContext>, token: CancelToken) {
    let events = ctx.events.gated(token.clone());
    let deadline = Instant::now() + ctx.config.start_timeout;

    loop {
        if token.is_cancelled() || !ctx.session.in_progress() {
            return;
        }
        if ctx.discovery.start_discovery() {
            break;
        }
        if Instant::now() >= deadline {
            log::warn!(
                "{}: gave up after {:?}",
                Error::DiscoveryStartTimeout,
                ctx.config.start_timeout
            );
            abort_start(&ctx);
            return;
        }
        if token.sleep(ctx.config.start_retry_delay) {
            return;
        }
    }

    events.emit(LinkEvent::ScanStarted { success: true });

    // Finish timer: only armed for timeouts above the minimal threshold.
    if let Some(timeout) = ctx.request.timeout {
        if timeout > ctx.config.min_finish_timeout {
            if token.sleep(timeout) {
                return;
            }
            if ctx.session.in_progress() {
                log::debug!("scan timeout of {timeout:?} elapsed, terminating session");
                finish_scan(&ctx);
            }
        }
    }
}

/// Listener: moves the platform's discovery feed into the bounded buffer.
pub(crate) fn run_listener(
    ctx: Arc<ScanContext>,
    feed: Receiver<DiscoveryEvent>,
    token: CancelToken,
) {
    loop {
        if token.is_cancelled() || !ctx.session.in_progress() {
            return;
        }
        match feed.recv_timeout(PARK_INTERVAL) {
            Ok(DiscoveryEvent::DeviceFound(device)) => {
                if ctx.session.in_progress() {
                    ctx.buffer.push(device);
                }
            }
            Ok(DiscoveryEvent::Finished) => {
                log::debug!("platform reported discovery finished");
                finish_scan(&ctx);
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Collector: dedups sightings, reports them, and evaluates the filter.
pub(crate) fn run_collector(ctx: Arc<ScanContext>, token: CancelToken) {
    let events = ctx.events.gated(token.clone());

    while !token.is_cancelled() {
        let Some(device) = ctx.buffer.pop() else {
            if !ctx.session.in_progress() {
                break;
            }
            ctx.buffer.wait(PARK_INTERVAL);
            continue;
        };

        if !ctx.session.in_progress() {
            break;
        }
        if !ctx.session.first_sighting(&device) {
            continue;
        }
        events.emit(LinkEvent::Scanning(device.clone()));

        if !ctx.request.has_filter() {
            continue;
        }
        // Once a target is recorded the remaining backlog is still drained,
        // but no further evaluation happens.
        if ctx.session.matched().is_some() {
            continue;
        }
        if ctx.request.matches(&device) && ctx.session.record_match(device.clone()) {
            log::debug!("matched target {device}");
            finish_scan(&ctx);
        }
    }

    // The session is over; discard whatever is still buffered.
    ctx.buffer.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventDispatcher;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{self, Sender};
    use std::thread;

    /// Scripted discovery service for driving the workers directly.
    struct FakeDiscovery {
        start_results: Mutex<Vec<bool>>,
        start_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
        discovering: AtomicBool,
    }

    impl FakeDiscovery {
        fn new(start_results: Vec<bool>) -> Self {
            Self {
                start_results: Mutex::new(start_results),
                start_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
                discovering: AtomicBool::new(false),
            }
        }

        fn always_starts() -> Self {
            Self::new(Vec::new())
        }
    }

    impl DiscoveryService for FakeDiscovery {
        fn is_enabled(&self) -> bool {
            true
        }

        fn start_discovery(&self) -> bool {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            let started = {
                let mut results = self.start_results.lock().unwrap();
                if results.is_empty() {
                    true
                } else {
                    results.remove(0)
                }
            };
            if started {
                self.discovering.store(true, Ordering::SeqCst);
            }
            started
        }

        fn cancel_discovery(&self) {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            self.discovering.store(false, Ordering::SeqCst);
        }

        fn is_discovering(&self) -> bool {
            self.discovering.load(Ordering::SeqCst)
        }

        fn subscribe(&self, _sink: Sender<DiscoveryEvent>) {}

        fn unsubscribe(&self) {}
    }

    struct Harness {
        ctx: Arc<ScanContext>,
        events: mpsc::Receiver<LinkEvent>,
        matches: Arc<Mutex<Vec<PeerDevice>>>,
        _dispatcher: EventDispatcher,
    }

    fn harness(request: ScanRequest, discovery: Arc<FakeDiscovery>) -> Harness {
        let (tx, rx) = mpsc::channel();
        let dispatcher = EventDispatcher::new(move |event| {
            let _ = tx.send(event);
        });
        let matches = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&matches);
        let ctx = Arc::new(ScanContext {
            session: Arc::new(ScanSession::begin()),
            buffer: Arc::new(DiscoveryBuffer::new()),
            discovery,
            events: dispatcher.sender(),
            request,
            config: fast_config(),
            on_match: Arc::new(move |device| {
                recorded.lock().unwrap().push(device);
            }),
        });
        Harness {
            ctx,
            events: rx,
            matches,
            _dispatcher: dispatcher,
        }
    }

    fn fast_config() -> LinkConfig {
        LinkConfig {
            start_timeout: Duration::from_millis(100),
            start_retry_delay: Duration::from_millis(5),
            min_finish_timeout: Duration::from_millis(10),
            ..LinkConfig::default()
        }
    }

    fn next_event(rx: &mpsc::Receiver<LinkEvent>) -> LinkEvent {
        rx.recv_timeout(Duration::from_secs(2)).expect("event")
    }

    fn device(address: &str, name: &str) -> PeerDevice {
        PeerDevice::named(address, name)
    }

    #[test]
    fn test_start_worker_retries_until_discovery_starts() {
        let discovery = Arc::new(FakeDiscovery::new(vec![false, false, true]));
        let h = harness(ScanRequest::new(), Arc::clone(&discovery));

        run_start_worker(Arc::clone(&h.ctx), CancelToken::new());

        assert_eq!(discovery.start_calls.load(Ordering::SeqCst), 3);
        assert_eq!(next_event(&h.events), LinkEvent::ScanStarted { success: true });
        assert!(h.ctx.session.in_progress());
    }

    #[test]
    fn test_start_worker_aborts_after_start_timeout() {
        // Adapter stays busy forever.
        let discovery = Arc::new(FakeDiscovery::new(vec![false; 1000]));
        let h = harness(ScanRequest::new(), Arc::clone(&discovery));

        run_start_worker(Arc::clone(&h.ctx), CancelToken::new());

        assert_eq!(next_event(&h.events), LinkEvent::ScanStarted { success: false });
        assert!(!h.ctx.session.in_progress());
    }

    #[test]
    fn test_finish_timer_terminates_session_without_match() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let request = ScanRequest::new()
            .with_names(["Printer"])
            .with_timeout(Duration::from_millis(50));
        let h = harness(request, discovery);

        run_start_worker(Arc::clone(&h.ctx), CancelToken::new());

        assert_eq!(next_event(&h.events), LinkEvent::ScanStarted { success: true });
        assert_eq!(next_event(&h.events), LinkEvent::ScanFinished { matched: false });
        assert!(!h.ctx.session.in_progress());
    }

    #[test]
    fn test_timeout_below_threshold_does_not_arm_finish_timer() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let request = ScanRequest::new().with_timeout(Duration::from_millis(5));
        let h = harness(request, discovery);

        run_start_worker(Arc::clone(&h.ctx), CancelToken::new());

        assert_eq!(next_event(&h.events), LinkEvent::ScanStarted { success: true });
        // No finish event: the requested timeout is under the threshold.
        assert!(h
            .events
            .recv_timeout(Duration::from_millis(50))
            .is_err());
        assert!(h.ctx.session.in_progress());
    }

    #[test]
    fn test_collector_dedups_by_address() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let h = harness(ScanRequest::new(), discovery);

        h.ctx.buffer.push(device("AA:BB", "One"));
        h.ctx.buffer.push(device("AA:BB", "One"));
        h.ctx.buffer.push(device("CC:DD", "Two"));
        h.ctx.buffer.push(device("AA:BB", "One"));

        let ctx = Arc::clone(&h.ctx);
        let token = CancelToken::new();
        let collector_token = token.clone();
        let collector = thread::spawn(move || run_collector(ctx, collector_token));

        assert_eq!(next_event(&h.events), LinkEvent::Scanning(device("AA:BB", "One")));
        assert_eq!(next_event(&h.events), LinkEvent::Scanning(device("CC:DD", "Two")));
        assert!(h.events.recv_timeout(Duration::from_millis(50)).is_err());

        token.cancel();
        h.ctx.buffer.notify();
        collector.join().unwrap();
    }

    #[test]
    fn test_collector_concludes_on_name_match_and_stops_reporting() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        discovery.discovering.store(true, Ordering::SeqCst);
        let request = ScanRequest::new().with_names(["X"]);
        let h = harness(request, Arc::clone(&discovery));

        h.ctx.buffer.push(device("01:01", "A"));
        h.ctx.buffer.push(device("02:02", "X"));
        h.ctx.buffer.push(device("03:03", "B"));

        let ctx = Arc::clone(&h.ctx);
        let collector = thread::spawn(move || run_collector(ctx, CancelToken::new()));
        collector.join().unwrap();

        assert_eq!(next_event(&h.events), LinkEvent::Scanning(device("01:01", "A")));
        assert_eq!(next_event(&h.events), LinkEvent::Scanning(device("02:02", "X")));
        assert_eq!(next_event(&h.events), LinkEvent::ScanFinished { matched: true });
        // The trailing device is drained away, never reported.
        assert!(h.events.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(h.ctx.buffer.is_empty());

        assert_eq!(h.ctx.session.matched(), Some(device("02:02", "X")));
        // Match cancels the still-active discovery run.
        assert_eq!(discovery.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_address_match_wins_over_name_list() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let request = ScanRequest::new()
            .with_names(["Decoy"])
            .with_address("0F:0F");
        let h = harness(request, discovery);

        h.ctx.buffer.push(device("AA:AA", "Decoy"));
        h.ctx.buffer.push(device("0F:0F", "Whatever"));

        let ctx = Arc::clone(&h.ctx);
        let collector = thread::spawn(move || run_collector(ctx, CancelToken::new()));
        collector.join().unwrap();

        assert_eq!(h.ctx.session.matched(), Some(PeerDevice::new("0F:0F")));
    }

    #[test]
    fn test_no_filter_session_never_self_terminates() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let h = harness(ScanRequest::new(), discovery);

        h.ctx.buffer.push(device("AA:BB", "Anything"));

        let ctx = Arc::clone(&h.ctx);
        let token = CancelToken::new();
        let collector_token = token.clone();
        let collector = thread::spawn(move || run_collector(ctx, collector_token));

        assert_eq!(
            next_event(&h.events),
            LinkEvent::Scanning(device("AA:BB", "Anything"))
        );
        assert!(h.ctx.session.in_progress());

        // Only an external conclusion ends it, and it reports no match.
        finish_scan(&h.ctx);
        assert_eq!(next_event(&h.events), LinkEvent::ScanFinished { matched: false });
        token.cancel();
        h.ctx.buffer.notify();
        collector.join().unwrap();
    }

    #[test]
    fn test_finish_scan_is_idempotent() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let h = harness(ScanRequest::new().with_names(["X"]), discovery);

        finish_scan(&h.ctx);
        finish_scan(&h.ctx);

        assert_eq!(next_event(&h.events), LinkEvent::ScanFinished { matched: false });
        assert!(h.events.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_matched_auto_connect_hands_off_target() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let request = ScanRequest::new().with_address("0A:0A").auto_connect(true);
        let h = harness(request, discovery);

        h.ctx.buffer.push(device("0A:0A", "Target"));

        let ctx = Arc::clone(&h.ctx);
        let collector = thread::spawn(move || run_collector(ctx, CancelToken::new()));
        collector.join().unwrap();

        assert_eq!(h.matches.lock().unwrap().as_slice(), &[device("0A:0A", "Target")]);
    }

    #[test]
    fn test_listener_buffers_found_devices_and_finishes_session() {
        let discovery = Arc::new(FakeDiscovery::always_starts());
        let h = harness(ScanRequest::new(), discovery);

        let (tx, feed) = mpsc::channel();
        let ctx = Arc::clone(&h.ctx);
        let listener = thread::spawn(move || run_listener(ctx, feed, CancelToken::new()));

        tx.send(DiscoveryEvent::DeviceFound(device("AA:BB", "One"))).unwrap();
        tx.send(DiscoveryEvent::Finished).unwrap();
        listener.join().unwrap();

        assert_eq!(h.ctx.buffer.pop(), Some(device("AA:BB", "One")));
        assert_eq!(next_event(&h.events), LinkEvent::ScanFinished { matched: false });
    }
}
