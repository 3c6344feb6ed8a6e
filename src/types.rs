//! Core types for peer discovery and link management.
//!
//! Provides the peer identity type, scan request parameters, and the
//! controller tuning knobs.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// A discovered (or known) nearby peer device.
///
/// The address is the stable, unique identity of a peer; the human-readable
/// name is advertised by some devices and absent on others. Two handles are
/// equal when their addresses are equal, regardless of name.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeerDevice {
    /// Stable, unique device address (e.g. `AA:BB:CC:DD:EE:FF`).
    pub address: String,
    /// Advertised device name, if any.
    pub name: Option<String>,
}

impl PeerDevice {
    /// Creates a handle for a device with no advertised name.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    /// Creates a handle for a device with an advertised name.
    pub fn named(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
        }
    }

    /// Returns the display name: the advertised name when present,
    /// the address otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for PeerDevice {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerDevice {}

impl Hash for PeerDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Immutable parameters for one scan.
///
/// A request may carry a name allow-list, a single target address, or both;
/// address matching takes priority. Requests with neither are plain
/// discovery scans that never self-terminate on a match.
///
/// # Examples
///
/// ```
/// use peerlink::ScanRequest;
/// use std::time::Duration;
///
/// // Plain discovery, runs until cancelled.
/// let discover = ScanRequest::new();
/// assert!(!discover.has_filter());
///
/// // Find a device named "SCALE-01" within 5 seconds and connect to it.
/// let targeted = ScanRequest::new()
///     .with_names(["SCALE-01"])
///     .with_timeout(Duration::from_secs(5))
///     .auto_connect(true);
/// assert!(targeted.has_filter());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanRequest {
    /// Exact device names that count as a match (case-sensitive).
    pub names: Vec<String>,
    /// Exact device address that counts as a match; takes priority over names.
    pub address: Option<String>,
    /// Absolute scan duration; the scan is force-terminated when it elapses.
    /// Must exceed [`LinkConfig::min_finish_timeout`] to take effect.
    pub timeout: Option<Duration>,
    /// Connect to the matched device as soon as the scan concludes with one.
    /// Requires at least one filter criterion.
    pub auto_connect: bool,
}

impl ScanRequest {
    /// Creates an empty request (plain discovery, no filter, no timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name allow-list.
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the target address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the absolute scan timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the auto-connect flag.
    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Returns true when the request carries any match criteria.
    pub fn has_filter(&self) -> bool {
        !self.names.is_empty() || self.address.is_some()
    }

    /// Evaluates the filter against a device.
    ///
    /// Address equality takes priority; the name list is only consulted when
    /// no target address is set. Name matching is exact and case-sensitive.
    pub fn matches(&self, device: &PeerDevice) -> bool {
        if let Some(address) = &self.address {
            return *address == device.address;
        }
        match &device.name {
            Some(name) => self.names.iter().any(|n| n == name),
            None => false,
        }
    }
}

/// Behavior of the read accumulator when new bytes arrive while unflushed
/// bytes are still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReadPolicy {
    /// Append new bytes to the pending accumulator, so a flush delivers
    /// everything read since the previous flush.
    #[default]
    Append,
    /// Replace the pending accumulator with the newest read. Bursty arrival
    /// can silently drop earlier unflushed bytes; kept for hosts that depend
    /// on latest-value semantics.
    Replace,
}

/// Tuning knobs for the link controller.
///
/// The defaults are the production values; tests shrink the timings to keep
/// wall-clock time down.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Wall-clock budget for discovery to start before the scan is aborted.
    pub start_timeout: Duration,
    /// Delay between discovery start attempts while the adapter is busy.
    pub start_retry_delay: Duration,
    /// A requested scan timeout must exceed this to arm the finish timer.
    pub min_finish_timeout: Duration,
    /// Stream connect attempts before giving up.
    pub connect_attempts: u32,
    /// Settle delay after a connect attempt returns success.
    pub connect_settle: Duration,
    /// Sleep between read polls when no bytes are available.
    pub read_poll_interval: Duration,
    /// Accumulator behavior for the read loop.
    pub read_policy: ReadPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_millis(2000),
            start_retry_delay: Duration::from_millis(100),
            min_finish_timeout: Duration::from_millis(1000),
            connect_attempts: 2,
            connect_settle: Duration::from_millis(200),
            read_poll_interval: Duration::from_millis(10),
            read_policy: ReadPolicy::default(),
        }
    }
}
