//! HTTP service boundary for the trotro seat engine.
//!
//! Exposes the engine's operation surface over axum: trip registration,
//! reservations, availability queries, the location feed, driver overrides,
//! the audit journal and a server-sent-events stream of engine events.
//!
//! Authentication and payment live in front of this boundary; the handlers
//! trust the actor identity carried in the `x-actor-role` / `x-actor-id`
//! headers.

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
