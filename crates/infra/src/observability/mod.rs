//! Tracing subscriber setup for binaries and tools

pub mod logging;

pub use logging::{build_filter, init_tracing};
