//! Observability module providing logging setup for the binary.
//!
//! Structured logging with configurable formats (pretty, compact, JSON) and
//! environment-based filtering. Library code only emits `tracing` events and
//! `metrics` counters; installing subscribers and recorders is left to the
//! embedding application.

pub mod metrics;
#[cfg(feature = "cli")]
mod tracing_init;

#[cfg(feature = "cli")]
pub use tracing_init::*;
