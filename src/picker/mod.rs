//! Pick-time routing decisions.
//!
//! A picker is an immutable snapshot published by the policy: the ring
//! picker routes against the live endpoint set, the queue picker parks every
//! request until the next picker arrives, and the failure picker fails every
//! request with a fixed status. The three variants are a tagged enum and all
//! dispatch is by case analysis.

use crate::endpoint::{ConnectivityState, EndpointEntry, EndpointSet};
use crate::ring::Ring;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Call attribute carrying the request hash, as a decimal `u64` string.
pub const REQUEST_RING_HASH_ATTRIBUTE: &str = "request_ring_hash";

/// Status code attached to a failed pick or a channel state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Internal,
    Unavailable,
}

/// Error status produced by the policy core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: Code::Internal,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: Code::Unavailable,
            message: message.into(),
        }
    }
}

/// Per-call arguments for a pick.
///
/// Carries the string call attributes set by the call-site hash policy; the
/// only attribute the ring picker consumes is
/// [`REQUEST_RING_HASH_ATTRIBUTE`].
#[derive(Debug, Clone, Default)]
pub struct PickArgs {
    attributes: HashMap<String, String>,
}

impl PickArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a string call attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Shorthand for attaching the request ring hash.
    pub fn with_ring_hash(hash: u64) -> Self {
        Self::new().with_attribute(REQUEST_RING_HASH_ATTRIBUTE, hash.to_string())
    }

    /// Look up a call attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Outcome of a single pick.
#[derive(Clone)]
pub enum PickResult {
    /// Route the request to this endpoint.
    Complete(Arc<EndpointEntry>),
    /// Park the request until a new picker is published.
    Queue,
    /// Fail the request with the given status.
    Fail(Status),
}

impl fmt::Debug for PickResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickResult::Complete(entry) => {
                f.debug_tuple("Complete").field(entry.address()).finish()
            }
            PickResult::Queue => f.write_str("Queue"),
            PickResult::Fail(status) => f.debug_tuple("Fail").field(status).finish(),
        }
    }
}

/// Receives the endpoints whose connect trigger must run after a pick, on
/// the policy's work serializer.
pub(crate) type ConnectSink = Arc<dyn Fn(Vec<Arc<EndpointEntry>>) + Send + Sync>;

/// Batch of deferred connect triggers collected during one pick.
///
/// Fires on drop, after the pick body has finished, so no transport code
/// ever runs inside the pick path.
struct ConnectBatch<'a> {
    sink: &'a ConnectSink,
    endpoints: Vec<Arc<EndpointEntry>>,
}

impl<'a> ConnectBatch<'a> {
    fn new(sink: &'a ConnectSink) -> Self {
        Self {
            sink,
            endpoints: Vec::new(),
        }
    }

    fn add(&mut self, endpoint: &Arc<EndpointEntry>) {
        if self.endpoints.iter().any(|e| Arc::ptr_eq(e, endpoint)) {
            return;
        }
        self.endpoints.push(Arc::clone(endpoint));
    }
}

impl Drop for ConnectBatch<'_> {
    fn drop(&mut self) {
        if !self.endpoints.is_empty() {
            (self.sink)(std::mem::take(&mut self.endpoints));
        }
    }
}

/// Immutable pick snapshot.
pub enum Picker {
    /// Route by request hash over the ring.
    Ring(RingPicker),
    /// Always queue; published while the channel is CONNECTING or IDLE.
    Queue,
    /// Always fail with the given status.
    Failure(Status),
}

impl Picker {
    /// Make a routing decision for one request.
    pub fn pick(&self, args: &PickArgs) -> PickResult {
        match self {
            Picker::Ring(picker) => picker.pick(args),
            Picker::Queue => PickResult::Queue,
            Picker::Failure(status) => PickResult::Fail(status.clone()),
        }
    }
}

/// Ring picker: binary search plus a circular secondary walk.
pub struct RingPicker {
    ring: Arc<Ring>,
    endpoints: Arc<EndpointSet>,
    connect_sink: ConnectSink,
}

impl RingPicker {
    pub(crate) fn new(
        ring: Arc<Ring>,
        endpoints: Arc<EndpointSet>,
        connect_sink: ConnectSink,
    ) -> Self {
        if tracing::enabled!(tracing::Level::TRACE) {
            for entry in endpoints.entries() {
                trace!(
                    address = %entry.address(),
                    state = %entry.transport().check_state(),
                    "ring picker endpoint"
                );
            }
        }
        Self {
            ring,
            endpoints,
            connect_sink,
        }
    }

    /// Endpoint set this picker routes over.
    pub fn endpoints(&self) -> &Arc<EndpointSet> {
        &self.endpoints
    }

    /// Ring this picker routes over.
    pub fn ring(&self) -> &Arc<Ring> {
        &self.ring
    }

    fn entry_at(&self, ring_index: usize) -> &Arc<EndpointEntry> {
        let endpoint_index = self.ring.entries()[ring_index].endpoint_index as usize;
        self.endpoints.entry(endpoint_index)
    }

    fn pick(&self, args: &PickArgs) -> PickResult {
        let hash = match args
            .attribute(REQUEST_RING_HASH_ATTRIBUTE)
            .and_then(|raw| raw.parse::<u64>().ok())
        {
            Some(hash) => hash,
            None => {
                return PickResult::Fail(Status::internal("ring hash value is not a number"))
            }
        };

        let first_index = self.ring.find(hash);
        let first = self.entry_at(first_index);
        let mut connects = ConnectBatch::new(&self.connect_sink);

        match first.report_state() {
            ConnectivityState::Ready => return PickResult::Complete(Arc::clone(first)),
            ConnectivityState::Idle => {
                connects.add(first);
                return PickResult::Queue;
            }
            ConnectivityState::Connecting => return PickResult::Queue,
            ConnectivityState::TransientFailure => {
                // The first choice is failed: kick off a connect on it and
                // walk the rest of the ring for an alternative.
                connects.add(first);
            }
            ConnectivityState::Shutdown => {}
        }

        let ring = self.ring.entries();
        let first_endpoint = ring[first_index].endpoint_index;
        let mut found_second = false;
        let mut found_first_non_failed = false;
        for offset in 1..ring.len() {
            let ring_index = (first_index + offset) % ring.len();
            if ring[ring_index].endpoint_index == first_endpoint {
                continue;
            }
            let endpoint = self.entry_at(ring_index);
            let state = endpoint.report_state();
            if state == ConnectivityState::Ready {
                return PickResult::Complete(Arc::clone(endpoint));
            }
            if state == ConnectivityState::Connecting && !found_second {
                return PickResult::Queue;
            }
            found_second = true;
            if !found_first_non_failed {
                if state == ConnectivityState::TransientFailure {
                    connects.add(endpoint);
                } else {
                    if state == ConnectivityState::Idle {
                        connects.add(endpoint);
                    }
                    found_first_non_failed = true;
                }
            }
        }
        // A usable endpoint was seen somewhere on the walk; its connect is
        // scheduled, so the request can wait for the next picker instead of
        // failing.
        if found_first_non_failed {
            return PickResult::Queue;
        }
        PickResult::Fail(Status::unavailable(
            "ring hash found a subchannel that is in TRANSIENT_FAILURE state",
        ))
    }
}

/// Atomically swappable cell holding the currently published picker.
///
/// The data plane loads the current picker with a lock-free read; the
/// control plane replaces it on every state update. Published pickers are
/// never mutated.
pub struct PickerSlot {
    current: ArcSwap<Picker>,
}

impl PickerSlot {
    /// New slot holding a queue picker, the state before the first update.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Picker::Queue),
        }
    }

    /// Replace the published picker.
    pub fn publish(&self, picker: Arc<Picker>) {
        self.current.store(picker);
    }

    /// Current picker.
    pub fn load(&self) -> Arc<Picker> {
        self.current.load_full()
    }

    /// Pick against the current picker.
    pub fn pick(&self, args: &PickArgs) -> PickResult {
        self.current.load().pick(args)
    }
}

impl Default for PickerSlot {
    fn default() -> Self {
        Self::new()
    }
}
