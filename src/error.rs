//! Crate-level error types.

use std::io;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A scan request was rejected before any worker started.
    #[error("scan rejected: {0}")]
    ScanRejected(String),

    /// Discovery did not start within the start-timeout budget.
    #[error("discovery failed to start within the allotted time")]
    DiscoveryStartTimeout,

    /// An operation required a live connection and none was present.
    #[error("not connected: {0}")]
    Disconnected(String),

    /// All connect attempts were exhausted without establishing a stream.
    #[error("connect failed after {attempts} attempt(s)")]
    ConnectFailed { attempts: u32 },

    /// A transport-level read/write error.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a rejection error with a reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::ScanRejected(reason.into())
    }

    /// Create a disconnected error with context.
    pub fn disconnected(context: impl Into<String>) -> Self {
        Self::Disconnected(context.into())
    }

    /// Returns true for errors caused by the absence of a live connection.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Returns true for transport-level I/O errors.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Collapses the error into the coarse fault kind reported in events.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::Disconnected(_) => FaultKind::Disconnected,
            _ => FaultKind::Io,
        }
    }
}

/// Coarse failure classification carried by read/write failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FaultKind {
    /// No live connection was present when the operation started.
    Disconnected,
    /// The connection was live but the transport reported an I/O failure.
    Io,
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;
