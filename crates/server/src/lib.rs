//! Caseboard HTTP server library.
//!
//! Exposes the Data API router and shared state for in-process testing.

pub mod api;
pub mod auth;

pub use api::{build_router, AppState, SharedState};
pub use auth::AuthContext;
