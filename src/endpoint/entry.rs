//! Per-endpoint slot.

use super::set::StateCounters;
use super::{Address, ConnectivityState, TransportHandle, WeightedAddress};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tracing::trace;

/// A single endpoint slot in an [`super::EndpointSet`].
///
/// Tracks the last raw connectivity state observed from the transport and
/// the derived report state used for aggregation. Once a failure has been
/// seen, the report state sticks to TRANSIENT_FAILURE until the transport
/// next reports READY, so that a flapping endpoint keeps counting as failed.
///
/// State fields are atomics: the data-plane pick path reads `report_state`
/// from arbitrary request threads, while all writes happen on the policy's
/// work serializer.
pub struct EndpointEntry {
    address: Address,
    weight: u32,
    transport: TransportHandle,
    raw_state: AtomicU8,
    report_state: AtomicU8,
    seen_failure_since_ready: AtomicBool,
}

impl EndpointEntry {
    pub(crate) fn new(address: WeightedAddress, transport: TransportHandle) -> Self {
        Self {
            address: address.address,
            weight: address.weight,
            transport,
            raw_state: AtomicU8::new(ConnectivityState::Idle as u8),
            report_state: AtomicU8::new(ConnectivityState::Idle as u8),
            seen_failure_since_ready: AtomicBool::new(false),
        }
    }

    /// Canonical backend address of this entry.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Ring weight of this entry.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Last raw connectivity state observed from the transport.
    pub fn raw_state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.raw_state.load(Ordering::Acquire))
    }

    /// Derived state used by the aggregator and the pick algorithm.
    pub fn report_state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.report_state.load(Ordering::Acquire))
    }

    pub(crate) fn seen_failure_since_ready(&self) -> bool {
        self.seen_failure_since_ready.load(Ordering::Acquire)
    }

    pub(crate) fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Ask the transport to start a connection attempt. Safe from any thread;
    /// the transport contract makes repeated calls no-ops.
    pub(crate) fn request_connect(&self) {
        trace!(address = %self.address, "requesting connection attempt");
        self.transport.attempt_to_connect();
    }

    /// Apply a raw connectivity state observation.
    ///
    /// Computes the delta between the previous and the new report state and
    /// applies it to `counters`. Must only be called on the work serializer.
    pub(crate) fn observe(&self, new_raw: ConnectivityState, counters: &StateCounters) {
        let old_raw = self.raw_state();
        if old_raw == ConnectivityState::Shutdown {
            return;
        }
        if new_raw == ConnectivityState::Shutdown {
            // Terminal: detach from counter tracking.
            counters.remove(self.report_state());
            self.report_state
                .store(ConnectivityState::Shutdown as u8, Ordering::Release);
            self.raw_state
                .store(ConnectivityState::Shutdown as u8, Ordering::Release);
            return;
        }
        // While we haven't seen a failure since the last READY, report the
        // raw state as-is. Once a failure is seen, keep reporting
        // TRANSIENT_FAILURE and swallow every change until READY clears it.
        if !self.seen_failure_since_ready.load(Ordering::Acquire) {
            if new_raw == ConnectivityState::TransientFailure {
                self.seen_failure_since_ready.store(true, Ordering::Release);
            }
            counters.transition(self.report_state(), new_raw);
            self.report_state.store(new_raw as u8, Ordering::Release);
        } else if new_raw == ConnectivityState::Ready {
            self.seen_failure_since_ready.store(false, Ordering::Release);
            counters.transition(ConnectivityState::TransientFailure, new_raw);
            self.report_state.store(new_raw as u8, Ordering::Release);
        }
        self.raw_state.store(new_raw as u8, Ordering::Release);
    }

    /// Forward a backoff reset to the transport.
    pub(crate) fn reset_backoff(&self) {
        self.transport.reset_backoff();
    }
}

impl std::fmt::Debug for EndpointEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointEntry")
            .field("address", &self.address)
            .field("weight", &self.weight)
            .field("raw_state", &self.raw_state())
            .field("report_state", &self.report_state())
            .field(
                "seen_failure_since_ready",
                &self.seen_failure_since_ready(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointTransport, StateWatcher};
    use std::sync::Arc;

    struct NullTransport;

    impl EndpointTransport for NullTransport {
        fn start_watch(&self, _watcher: StateWatcher) {}
        fn attempt_to_connect(&self) {}
        fn check_state(&self) -> ConnectivityState {
            ConnectivityState::Idle
        }
        fn reset_backoff(&self) {}
    }

    fn entry() -> (EndpointEntry, StateCounters) {
        let entry = EndpointEntry::new(
            WeightedAddress::new("10.0.0.1:80", 1),
            Arc::new(NullTransport),
        );
        (entry, StateCounters::with_idle(1))
    }

    #[test]
    fn test_report_follows_raw_before_failure() {
        let (entry, counters) = entry();

        entry.observe(ConnectivityState::Connecting, &counters);
        assert_eq!(entry.report_state(), ConnectivityState::Connecting);

        entry.observe(ConnectivityState::Ready, &counters);
        assert_eq!(entry.report_state(), ConnectivityState::Ready);
        assert_eq!(counters.snapshot().ready, 1);
    }

    #[test]
    fn test_sticky_failure_until_ready() {
        let (entry, counters) = entry();

        entry.observe(ConnectivityState::TransientFailure, &counters);
        assert!(entry.seen_failure_since_ready());
        assert_eq!(entry.report_state(), ConnectivityState::TransientFailure);

        // Reconnect attempts do not clear the sticky bit.
        entry.observe(ConnectivityState::Connecting, &counters);
        assert_eq!(entry.report_state(), ConnectivityState::TransientFailure);
        assert_eq!(entry.raw_state(), ConnectivityState::Connecting);
        assert_eq!(counters.snapshot().transient_failure, 1);

        entry.observe(ConnectivityState::Idle, &counters);
        assert_eq!(entry.report_state(), ConnectivityState::TransientFailure);

        // READY clears it.
        entry.observe(ConnectivityState::Ready, &counters);
        assert!(!entry.seen_failure_since_ready());
        assert_eq!(entry.report_state(), ConnectivityState::Ready);
        assert_eq!(counters.snapshot().ready, 1);
        assert_eq!(counters.snapshot().transient_failure, 0);
    }

    #[test]
    fn test_shutdown_is_terminal_and_detaches() {
        let (entry, counters) = entry();

        entry.observe(ConnectivityState::Shutdown, &counters);
        assert_eq!(entry.raw_state(), ConnectivityState::Shutdown);
        assert_eq!(counters.snapshot().total(), 0);

        // Later observations are ignored.
        entry.observe(ConnectivityState::Ready, &counters);
        assert_eq!(entry.raw_state(), ConnectivityState::Shutdown);
        assert_eq!(counters.snapshot().total(), 0);
    }

    #[test]
    fn test_failure_roundtrip_restores_counters() {
        let (entry, counters) = entry();

        entry.observe(ConnectivityState::Ready, &counters);
        let before = counters.snapshot();

        entry.observe(ConnectivityState::TransientFailure, &counters);
        entry.observe(ConnectivityState::Ready, &counters);

        assert_eq!(counters.snapshot(), before);
    }
}
