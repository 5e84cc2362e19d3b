//! Queue draining: ports and the coordinator that drives them.

pub mod coordinator;
pub mod ports;
