//! Shared application state for the HTTP handlers.

use std::sync::Arc;
use trotro_core::Engine;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The reservation/occupancy engine
    pub engine: Arc<Engine>,
    /// Geofence radius applied to stops registered without an explicit one
    pub default_fence_radius_m: f64,
}

impl AppState {
    /// Creates the state wrapper.
    #[must_use]
    pub fn new(engine: Arc<Engine>, default_fence_radius_m: f64) -> Self {
        Self {
            engine,
            default_fence_radius_m,
        }
    }
}
