//! ringlb - A consistent ring-hash load balancing policy core
//!
//! This crate provides the core of a ring-hash load balancing policy for an
//! RPC client channel:
//! - Bounded-size consistent hash ring over weighted endpoints
//! - Hash-based pick algorithm against live per-endpoint connectivity
//! - Aggregation of endpoint states into a single channel state
//! - Proactive ring-walk recovery out of failure quiescence
//!
//! The channel runtime plugs in through two seams: it implements
//! [`policy::ControlHelper`] (state reporting, re-resolution, endpoint
//! creation) and [`endpoint::EndpointTransport`] (per-endpoint connectivity
//! and connect triggers), and drives [`policy::RingHashPolicy`] with
//! resolver updates.

pub mod config;
pub mod endpoint;
pub mod metrics;
pub mod picker;
pub mod policy;
pub mod ring;
pub mod util;

pub use config::RingHashConfig;
pub use picker::{PickArgs, PickResult, Picker, PickerSlot, REQUEST_RING_HASH_ATTRIBUTE};
pub use policy::{ControlHelper, RingHashFactory, RingHashPolicy, POLICY_NAME};
