//! Shared service helpers: the block window and telemetry wiring.

pub mod telemetry;
pub mod window;

pub use telemetry::*;
pub use window::*;
