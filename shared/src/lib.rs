//! Shared types and models for the Transfer Manager
//!
//! This crate holds the pure transfer domain: state machine, quantity rules,
//! line planning and input normalisation. It performs no I/O so the backend
//! and its tests can rely on it without a database or network.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
