//! Event bus for decoupled communication

pub mod bus;

pub use bus::{EventBus, HandlerResult, SubscriptionHandle};
