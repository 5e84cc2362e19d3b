//! # FieldSync App
//!
//! Application layer - composition root and process entry point.
//!
//! This crate contains:
//! - Application context (dependency injection)
//! - The `fieldsync` binary
//!
//! ## Architecture
//! - Depends on `common`, `domain`, `core`, and `infra`
//! - Wires up the hexagonal architecture

pub mod context;

pub use context::*;
