//! Generation-scoped endpoint collection and its state counters.

use super::{ConnectivityState, EndpointEntry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Live per-state endpoint counters for one [`EndpointSet`].
///
/// The sum of all four counters always equals the number of live
/// (non-SHUTDOWN) entries in the set. Counters are only mutated on the work
/// serializer; the atomics exist so the set can be shared read-only with
/// pickers.
pub(crate) struct StateCounters {
    num_idle: AtomicUsize,
    num_connecting: AtomicUsize,
    num_ready: AtomicUsize,
    num_transient_failure: AtomicUsize,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub idle: usize,
    pub connecting: usize,
    pub ready: usize,
    pub transient_failure: usize,
}

impl CounterSnapshot {
    /// Number of live endpoints covered by the snapshot.
    pub fn total(&self) -> usize {
        self.idle + self.connecting + self.ready + self.transient_failure
    }
}

impl StateCounters {
    /// All entries begin in IDLE, so a fresh set starts with `idle = n`.
    pub(crate) fn with_idle(n: usize) -> Self {
        Self {
            num_idle: AtomicUsize::new(n),
            num_connecting: AtomicUsize::new(0),
            num_ready: AtomicUsize::new(0),
            num_transient_failure: AtomicUsize::new(0),
        }
    }

    fn slot(&self, state: ConnectivityState) -> &AtomicUsize {
        match state {
            ConnectivityState::Idle => &self.num_idle,
            ConnectivityState::Connecting => &self.num_connecting,
            ConnectivityState::Ready => &self.num_ready,
            ConnectivityState::TransientFailure => &self.num_transient_failure,
            ConnectivityState::Shutdown => {
                unreachable!("SHUTDOWN endpoints are not counted")
            }
        }
    }

    /// Move one endpoint from `old` to `new`.
    ///
    /// IDLE is handled asymmetrically: an IDLE→IDLE transition does not
    /// decrement, matching the seeding behavior of the counter scheme this
    /// is derived from.
    pub(crate) fn transition(&self, old: ConnectivityState, new: ConnectivityState) {
        assert!(old != ConnectivityState::Shutdown && new != ConnectivityState::Shutdown);
        if old != ConnectivityState::Idle || new != ConnectivityState::Idle {
            let prev = self.slot(old).fetch_sub(1, Ordering::Relaxed);
            assert!(prev > 0, "counter underflow leaving {old}");
        }
        self.slot(new).fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one endpoint from tracking entirely (SHUTDOWN).
    pub(crate) fn remove(&self, old: ConnectivityState) {
        assert!(old != ConnectivityState::Shutdown);
        let prev = self.slot(old).fetch_sub(1, Ordering::Relaxed);
        assert!(prev > 0, "counter underflow removing {old}");
    }

    pub(crate) fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            idle: self.num_idle.load(Ordering::Relaxed),
            connecting: self.num_connecting.load(Ordering::Relaxed),
            ready: self.num_ready.load(Ordering::Relaxed),
            transient_failure: self.num_transient_failure.load(Ordering::Relaxed),
        }
    }
}

/// Ordered collection of endpoint entries for one resolver generation.
///
/// A new set is built on every resolver update; pickers hold shared
/// read-only handles, so an old set stays alive until the last picker
/// referencing it is replaced.
pub struct EndpointSet {
    entries: Vec<Arc<EndpointEntry>>,
    counters: StateCounters,
    generation: u64,
}

impl EndpointSet {
    pub(crate) fn new(entries: Vec<Arc<EndpointEntry>>, generation: u64) -> Self {
        let counters = StateCounters::with_idle(entries.len());
        Self {
            entries,
            counters,
            generation,
        }
    }

    /// Number of endpoints in this generation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`. Panics when out of bounds; ring entries only ever
    /// carry indexes produced for this set.
    pub fn entry(&self, index: usize) -> &Arc<EndpointEntry> {
        &self.entries[index]
    }

    pub fn entries(&self) -> &[Arc<EndpointEntry>] {
        &self.entries
    }

    /// Resolver generation this set belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn counters(&self) -> &StateCounters {
        &self.counters
    }

    /// Current counter values.
    pub fn counter_snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}
