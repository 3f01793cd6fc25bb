//! Metrics collector using prometheus-client.
//!
//! Control-plane metrics only: resolver updates, published channel states,
//! connect attempts, and ring geometry. The pick path stays metric-free by
//! design, so picks never touch shared counters.

use crate::endpoint::ConnectivityState;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Labels for channel state update metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateLabels {
    pub state: StateLabel,
}

/// Channel state as a metric label.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StateLabel {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
}

impl From<ConnectivityState> for StateLabel {
    fn from(state: ConnectivityState) -> Self {
        match state {
            ConnectivityState::Idle => StateLabel::Idle,
            ConnectivityState::Connecting => StateLabel::Connecting,
            ConnectivityState::Ready => StateLabel::Ready,
            ConnectivityState::TransientFailure | ConnectivityState::Shutdown => {
                StateLabel::TransientFailure
            }
        }
    }
}

/// Collects and stores the policy's control-plane metrics.
#[derive(Clone)]
pub struct PolicyMetrics {
    inner: Arc<PolicyMetricsInner>,
}

struct PolicyMetricsInner {
    /// Resolver updates ingested.
    resolver_updates: Counter,
    /// Channel state publications, by state.
    state_updates: Family<StateLabels, Counter>,
    /// Connect attempts triggered by the policy.
    connect_attempts: Counter,
    /// Re-resolution requests sent to the resolver.
    reresolution_requests: Counter,
    /// Current ring size.
    ring_size: Gauge,
    /// Endpoints in the current generation.
    endpoints: Gauge,
    /// The prometheus registry.
    registry: Registry,
}

impl PolicyMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let resolver_updates = Counter::default();
        let state_updates = Family::<StateLabels, Counter>::default();
        let connect_attempts = Counter::default();
        let reresolution_requests = Counter::default();
        let ring_size = Gauge::default();
        let endpoints = Gauge::default();

        registry.register(
            "ringlb_resolver_updates",
            "Total number of resolver updates ingested",
            resolver_updates.clone(),
        );
        registry.register(
            "ringlb_state_updates",
            "Total number of channel state publications",
            state_updates.clone(),
        );
        registry.register(
            "ringlb_connect_attempts",
            "Total number of connect attempts triggered by the policy",
            connect_attempts.clone(),
        );
        registry.register(
            "ringlb_reresolution_requests",
            "Total number of re-resolution requests",
            reresolution_requests.clone(),
        );
        registry.register(
            "ringlb_ring_size",
            "Number of entries on the current hash ring",
            ring_size.clone(),
        );
        registry.register(
            "ringlb_endpoints",
            "Number of endpoints in the current generation",
            endpoints.clone(),
        );

        Self {
            inner: Arc::new(PolicyMetricsInner {
                resolver_updates,
                state_updates,
                connect_attempts,
                reresolution_requests,
                ring_size,
                endpoints,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record an ingested resolver update.
    pub fn record_resolver_update(&self) {
        self.inner.resolver_updates.inc();
    }

    /// Record a channel state publication.
    pub fn record_state_update(&self, state: ConnectivityState) {
        let labels = StateLabels {
            state: state.into(),
        };
        self.inner.state_updates.get_or_create(&labels).inc();
    }

    /// Record a policy-triggered connect attempt.
    pub fn record_connect_attempt(&self) {
        self.inner.connect_attempts.inc();
    }

    /// Record a re-resolution request.
    pub fn record_reresolution_request(&self) {
        self.inner.reresolution_requests.inc();
    }

    /// Update the ring size gauge.
    pub fn set_ring_size(&self, size: usize) {
        self.inner.ring_size.set(size as i64);
    }

    /// Update the endpoint count gauge.
    pub fn set_endpoints(&self, count: usize) {
        self.inner.endpoints.set(count as i64);
    }
}

impl Default for PolicyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = PolicyMetrics::new();
        let _ = metrics.registry();
    }

    #[test]
    fn test_recorded_metrics_encode() {
        let metrics = PolicyMetrics::new();

        metrics.record_resolver_update();
        metrics.record_state_update(ConnectivityState::Ready);
        metrics.record_state_update(ConnectivityState::TransientFailure);
        metrics.record_connect_attempt();
        metrics.record_reresolution_request();
        metrics.set_ring_size(1024);
        metrics.set_endpoints(3);

        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, metrics.registry()).unwrap();

        assert!(buffer.contains("ringlb_resolver_updates"));
        assert!(buffer.contains("ringlb_state_updates"));
        assert!(buffer.contains("ringlb_ring_size 1024"));
        assert!(buffer.contains("ringlb_endpoints 3"));
    }
}
