//! Utility functions and helpers.

mod logging;
mod serializer;

pub use logging::init_logging;
pub use serializer::WorkSerializer;
