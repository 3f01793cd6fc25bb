//! Endpoint state tracking.
//!
//! An endpoint is a logical backend address plus the transport state machine
//! behind it. The policy core only ever talks to the transport through the
//! [`EndpointTransport`] trait; everything else in this module is bookkeeping
//! over the connectivity states the transport reports.

mod entry;
mod set;

pub use entry::EndpointEntry;
pub use set::{CounterSnapshot, EndpointSet};

pub(crate) use set::StateCounters;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Connectivity state of a single endpoint transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectivityState {
    Idle = 0,
    Connecting = 1,
    Ready = 2,
    TransientFailure = 3,
    /// Terminal. An endpoint that reports SHUTDOWN is detached from counter
    /// tracking and never leaves this state.
    Shutdown = 4,
}

impl ConnectivityState {
    /// Short uppercase name, matching the wire-level state names.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectivityState::Idle => "IDLE",
            ConnectivityState::Connecting => "CONNECTING",
            ConnectivityState::Ready => "READY",
            ConnectivityState::TransientFailure => "TRANSIENT_FAILURE",
            ConnectivityState::Shutdown => "SHUTDOWN",
        }
    }

    pub(crate) fn from_u8(value: u8) -> ConnectivityState {
        match value {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            4 => ConnectivityState::Shutdown,
            other => unreachable!("invalid connectivity state discriminant: {other}"),
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical backend address.
///
/// Two addresses are equal iff their canonical string form is equal; that
/// same string is the key fed to the ring hash, so it must not be trimmed or
/// normalized beyond what the constructor was given (host:port for IP
/// addresses, the abstract name for unix sockets).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from its canonical string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The canonical key string used as the ring-hash input.
    pub fn as_key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&str> for Address {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for Address {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A backend address together with its load-balancing weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedAddress {
    /// Canonical backend address.
    pub address: Address,

    /// Weight for ring construction (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl WeightedAddress {
    /// Convenience constructor.
    pub fn new(address: impl Into<Address>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

fn default_weight() -> u32 {
    1
}

/// Callback invoked by a transport for every connectivity state change.
pub type StateWatcher = Box<dyn Fn(ConnectivityState) + Send + Sync>;

/// Per-endpoint transport handle supplied by the channel runtime.
///
/// The policy core never opens connections itself; it only observes state
/// changes and asks the transport to connect.
pub trait EndpointTransport: Send + Sync {
    /// Register a connectivity watcher. The watcher is invoked with every
    /// state change, including an initial call carrying the current state
    /// (IDLE for a fresh transport).
    fn start_watch(&self, watcher: StateWatcher);

    /// Ask the transport to initiate a connection attempt. Idempotent:
    /// calling while already CONNECTING or READY is a no-op.
    fn attempt_to_connect(&self);

    /// Synchronous read of the current state. Only used for diagnostics at
    /// picker construction time.
    fn check_state(&self) -> ConnectivityState;

    /// Reset the transport's connection backoff.
    fn reset_backoff(&self);
}

/// Shared transport handle.
pub type TransportHandle = Arc<dyn EndpointTransport>;
