//! Channel-level state aggregation.

use crate::endpoint::{ConnectivityState, CounterSnapshot};

/// Result of one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Aggregate {
    /// Channel-level connectivity state.
    pub state: ConnectivityState,
    /// The channel is not READY and must proactively attempt connections.
    pub recovering: bool,
}

/// Compute the channel state from the live endpoint counters.
///
/// Rules, first match wins:
/// 1. any READY endpoint            -> READY
/// 2. any CONNECTING and < 2 failed -> CONNECTING
/// 3. any IDLE and < 2 failed       -> IDLE, recovering
/// 4. otherwise                     -> TRANSIENT_FAILURE, recovering
pub(crate) fn aggregate(counters: &CounterSnapshot) -> Aggregate {
    if counters.ready >= 1 {
        return Aggregate {
            state: ConnectivityState::Ready,
            recovering: false,
        };
    }
    if counters.connecting >= 1 && counters.transient_failure < 2 {
        return Aggregate {
            state: ConnectivityState::Connecting,
            recovering: false,
        };
    }
    if counters.idle >= 1 && counters.transient_failure < 2 {
        return Aggregate {
            state: ConnectivityState::Idle,
            recovering: true,
        };
    }
    Aggregate {
        state: ConnectivityState::TransientFailure,
        recovering: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(
        idle: usize,
        connecting: usize,
        ready: usize,
        transient_failure: usize,
    ) -> CounterSnapshot {
        CounterSnapshot {
            idle,
            connecting,
            ready,
            transient_failure,
        }
    }

    #[test]
    fn test_any_ready_wins() {
        let agg = aggregate(&counters(1, 1, 1, 5));
        assert_eq!(agg.state, ConnectivityState::Ready);
        assert!(!agg.recovering);
    }

    #[test]
    fn test_connecting_before_idle() {
        let agg = aggregate(&counters(2, 1, 0, 0));
        assert_eq!(agg.state, ConnectivityState::Connecting);
        assert!(!agg.recovering);
    }

    #[test]
    fn test_all_idle_reports_idle_recovering() {
        let agg = aggregate(&counters(3, 0, 0, 0));
        assert_eq!(agg.state, ConnectivityState::Idle);
        assert!(agg.recovering);
    }

    #[test]
    fn test_two_failures_dominate_connecting() {
        let agg = aggregate(&counters(0, 1, 0, 2));
        assert_eq!(agg.state, ConnectivityState::TransientFailure);
        assert!(agg.recovering);
    }

    #[test]
    fn test_two_failures_dominate_idle() {
        let agg = aggregate(&counters(1, 0, 0, 2));
        assert_eq!(agg.state, ConnectivityState::TransientFailure);
        assert!(agg.recovering);
    }

    #[test]
    fn test_single_failure_does_not_dominate() {
        let agg = aggregate(&counters(0, 1, 0, 1));
        assert_eq!(agg.state, ConnectivityState::Connecting);
    }

    #[test]
    fn test_all_failed() {
        let agg = aggregate(&counters(0, 0, 0, 3));
        assert_eq!(agg.state, ConnectivityState::TransientFailure);
        assert!(agg.recovering);
    }
}
