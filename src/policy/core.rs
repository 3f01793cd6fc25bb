//! Policy lifecycle and control-plane serialization.

use super::{aggregate, ControlHelper};
use crate::config::RingHashConfig;
use crate::endpoint::{ConnectivityState, EndpointEntry, EndpointSet, WeightedAddress};
use crate::metrics::PolicyMetrics;
use crate::picker::{ConnectSink, Picker, RingPicker, Status};
use crate::ring::Ring;
use crate::util::WorkSerializer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// The ring-hash load balancing policy.
///
/// Ingests resolver updates, owns the current endpoint set, and publishes
/// channel states and pickers to the [`ControlHelper`]. All control-plane
/// mutation runs on an internal work serializer; the published pickers are
/// safe to use from any request thread.
#[derive(Clone)]
pub struct RingHashPolicy {
    inner: Arc<PolicyInner>,
}

pub(crate) struct PolicyInner {
    helper: Arc<dyn ControlHelper>,
    serializer: WorkSerializer,
    metrics: PolicyMetrics,
    shutdown: AtomicBool,
    state: Mutex<PolicyState>,
}

/// Mutable policy state. Only touched inside serializer tasks, so the mutex
/// is never contended.
struct PolicyState {
    endpoints: Option<Arc<EndpointSet>>,
    ring: Option<Arc<Ring>>,
    generation: u64,
}

impl RingHashPolicy {
    /// Create a policy reporting into `helper`. The policy is inert until
    /// the first [`update`](Self::update).
    pub fn new(helper: Arc<dyn ControlHelper>) -> Self {
        Self {
            inner: Arc::new(PolicyInner {
                helper,
                serializer: WorkSerializer::new(),
                metrics: PolicyMetrics::new(),
                shutdown: AtomicBool::new(false),
                state: Mutex::new(PolicyState {
                    endpoints: None,
                    ring: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Control-plane metrics for this policy instance.
    pub fn metrics(&self) -> &PolicyMetrics {
        &self.inner.metrics
    }

    /// Endpoint set of the current generation, if any.
    pub fn endpoint_set(&self) -> Option<Arc<EndpointSet>> {
        self.inner.state.lock().unwrap().endpoints.clone()
    }

    /// Apply a resolver update.
    ///
    /// Weight-0 addresses are filtered out. A non-empty list starts a new
    /// generation: fresh endpoints are created through the helper, a new
    /// ring is built, watches are started, and an initial READY state with a
    /// ring picker is published (picks legally queue until an endpoint
    /// actually reports READY). An empty list publishes TRANSIENT_FAILURE
    /// and retains no endpoint set.
    pub fn update(&self, addresses: Vec<WeightedAddress>, config: RingHashConfig) {
        let inner = Arc::clone(&self.inner);
        self.inner.serializer.run(move || {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            inner.metrics.record_resolver_update();
            let addresses: Vec<WeightedAddress> =
                addresses.into_iter().filter(|a| a.weight > 0).collect();
            info!(addresses = addresses.len(), "applying resolver update");

            if addresses.is_empty() {
                {
                    let mut state = inner.state.lock().unwrap();
                    state.generation += 1;
                    state.endpoints = None;
                    state.ring = None;
                }
                warn!("resolver pushed an empty update");
                inner.metrics.set_ring_size(0);
                inner.metrics.set_endpoints(0);
                let status = Status::unavailable("Empty update");
                inner.publish(
                    ConnectivityState::TransientFailure,
                    Some(status.clone()),
                    Arc::new(Picker::Failure(status)),
                );
                return;
            }

            let ring = Arc::new(Ring::build(&addresses, &config));
            let entries: Vec<Arc<EndpointEntry>> = addresses
                .into_iter()
                .map(|address| {
                    let transport = inner.helper.create_endpoint(&address.address);
                    Arc::new(EndpointEntry::new(address, transport))
                })
                .collect();

            let (set, generation) = {
                let mut state = inner.state.lock().unwrap();
                state.generation += 1;
                let set = Arc::new(EndpointSet::new(entries, state.generation));
                state.endpoints = Some(Arc::clone(&set));
                state.ring = Some(Arc::clone(&ring));
                (set, state.generation)
            };
            inner.metrics.set_ring_size(ring.len());
            inner.metrics.set_endpoints(set.len());

            // Start watching every endpoint of the new generation.
            for (index, entry) in set.entries().iter().enumerate() {
                let weak = Arc::downgrade(&inner);
                entry.transport().start_watch(Box::new(move |new_state| {
                    if let Some(inner) = weak.upgrade() {
                        PolicyInner::on_endpoint_state_change(&inner, generation, index, new_state);
                    }
                }));
            }

            // Claim readiness up front: the ring picker queues until real
            // READY endpoints exist, so picks stay legal either way.
            let picker = Picker::Ring(RingPicker::new(
                ring,
                set,
                PolicyInner::connect_sink(&inner),
            ));
            inner.publish(ConnectivityState::Ready, None, Arc::new(picker));
        });
    }

    /// Reset the connection backoff of every endpoint in the current set.
    pub fn reset_backoff(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.serializer.run(move || {
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            let set = inner.state.lock().unwrap().endpoints.clone();
            if let Some(set) = set {
                for entry in set.entries() {
                    entry.reset_backoff();
                }
            }
        });
    }

    /// Shut the policy down.
    ///
    /// Terminal: suppresses every further connect trigger and state
    /// publication, including batches already queued on the serializer, and
    /// drops the current endpoint set.
    pub fn shutdown(&self) {
        // Flag first, outside the serializer, so queued connect batches and
        // updates see it and become no-ops.
        self.inner.shutdown.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        self.inner.serializer.run(move || {
            info!("shutting down ring-hash policy");
            let mut state = inner.state.lock().unwrap();
            state.endpoints = None;
            state.ring = None;
        });
    }
}

impl PolicyInner {
    /// Publish a channel state and picker to the helper.
    fn publish(&self, state: ConnectivityState, status: Option<Status>, picker: Arc<Picker>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }
        debug!(state = %state, "publishing channel state");
        self.metrics.record_state_update(state);
        self.helper.update_state(state, status, picker);
    }

    /// Sink handed to ring pickers: runs each collected connect batch on the
    /// serializer, after the pick that collected it has returned.
    fn connect_sink(inner: &Arc<PolicyInner>) -> ConnectSink {
        let weak: Weak<PolicyInner> = Arc::downgrade(inner);
        Arc::new(move |batch: Vec<Arc<EndpointEntry>>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let task_inner = Arc::clone(&inner);
            inner.serializer.run(move || {
                if task_inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                for endpoint in batch {
                    endpoint.request_connect();
                    task_inner.metrics.record_connect_attempt();
                }
            });
        })
    }

    /// Handle one connectivity notification from an endpoint watch.
    fn on_endpoint_state_change(
        inner: &Arc<PolicyInner>,
        generation: u64,
        index: usize,
        new_state: ConnectivityState,
    ) {
        let task_inner = Arc::clone(inner);
        inner.serializer.run(move || {
            if task_inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            let (set, ring) = {
                let state = task_inner.state.lock().unwrap();
                if state.generation != generation {
                    // Notification from a watch of a replaced generation.
                    return;
                }
                match (&state.endpoints, &state.ring) {
                    (Some(set), Some(ring)) => (Arc::clone(set), Arc::clone(ring)),
                    _ => return,
                }
            };

            let entry = set.entry(index);
            let old_state = entry.raw_state();
            if old_state == new_state {
                // Transports replay the current state when a watch starts.
                return;
            }
            debug!(
                address = %entry.address(),
                from = %old_state,
                to = %new_state,
                "endpoint connectivity changed"
            );

            if new_state == ConnectivityState::TransientFailure {
                task_inner.helper.request_reresolution();
                task_inner.metrics.record_reresolution_request();
            }

            entry.observe(new_state, set.counters());

            let agg = aggregate(&set.counter_snapshot());
            let (status, picker) = match agg.state {
                ConnectivityState::Ready => (
                    None,
                    Picker::Ring(RingPicker::new(
                        ring,
                        Arc::clone(&set),
                        PolicyInner::connect_sink(&task_inner),
                    )),
                ),
                ConnectivityState::Connecting | ConnectivityState::Idle => (None, Picker::Queue),
                ConnectivityState::TransientFailure => {
                    let status = Status::unavailable("connections to backend failing or idle");
                    (Some(status.clone()), Picker::Failure(status))
                }
                ConnectivityState::Shutdown => unreachable!("aggregate never reports SHUTDOWN"),
            };
            task_inner.publish(agg.state, status, Arc::new(picker));

            // Walk-the-ring recovery: while not READY, keep at least one
            // connection attempt moving. When the endpoint that just failed
            // triggered the aggregation, hand the attempt to its neighbor.
            if agg.recovering && new_state == ConnectivityState::TransientFailure {
                let next = (index + 1) % set.len();
                debug!(
                    failed = %entry.address(),
                    next = %set.entry(next).address(),
                    "walking the ring to the next endpoint"
                );
                set.entry(next).request_connect();
                task_inner.metrics.record_connect_attempt();
            }
        });
    }
}
