//! Request middleware

pub mod auth;
pub mod diagnostics;

pub use auth::{auth_middleware, AuthUser, CurrentUser};
pub use diagnostics::diagnostics_middleware;
