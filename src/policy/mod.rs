//! Ring-hash load balancing policy.

mod aggregator;
mod core;
mod factory;

pub use self::core::RingHashPolicy;
pub use factory::{RingHashFactory, POLICY_NAME};

pub(crate) use aggregator::aggregate;

use crate::endpoint::{Address, ConnectivityState, TransportHandle};
use crate::picker::{Picker, Status};
use std::sync::Arc;

/// Channel-side collaborator the policy reports into.
///
/// Implemented by the channel runtime: it receives every state transition
/// together with the picker to route with, serves re-resolution requests,
/// and manufactures the per-address endpoint transports.
pub trait ControlHelper: Send + Sync {
    /// Publish a new channel state, optional terminal status, and the
    /// picker requests should be routed with from now on.
    fn update_state(&self, state: ConnectivityState, status: Option<Status>, picker: Arc<Picker>);

    /// Ask the resolver for a fresh address list.
    fn request_reresolution(&self);

    /// Create the transport for one backend address.
    fn create_endpoint(&self, address: &Address) -> TransportHandle;
}
