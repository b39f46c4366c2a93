//! HTTP request handlers

pub mod actions;
pub mod health;
pub mod transfer;

pub use actions::{dispatch, legacy_dispatch, method_not_allowed};
pub use health::health_check;
