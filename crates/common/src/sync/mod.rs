//! Synchronization helpers shared by the sync coordinator and its adapters.
//!
//! - **`retry`**: backoff policy, retry execution and HTTP outcome
//!   classification

pub mod retry;
