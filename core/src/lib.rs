//! # Trotro Core
//!
//! Segment-based seat reservation and occupancy detection engine for shared
//! transit vehicles: one physical seat is independently booked, occupied
//! and released for multiple non-overlapping route segments within a single
//! trip, with boarding and drop-off driven by geofence detection instead of
//! manual check-in.
//!
//! ## Components
//!
//! - [`segment`] - half-open stop intervals and the per-trip stop index
//! - [`ledger`] - authoritative reservation store; owns the disjointness
//!   invariant behind one async mutex per (trip, seat)
//! - [`coordinator`] - serialized booking protocol (reserve / cancel)
//! - [`occupancy`] - the geofence-driven state machine
//!   (`Booked → OnBoard → Completed`), expressed as a [`reducer::Reducer`]
//! - [`store`] - per-trip runtime that orders occupancy actions and
//!   executes effects
//! - [`availability`] - "which seats are free for segment [a, b)"
//! - [`events`] - broadcast publisher for downstream consumers
//! - [`engine`] - the facade wiring it all together
//!
//! ## Concurrency model
//!
//! Booking and occupancy transitions for a seat share one per-(trip, seat)
//! mutex; different seats and different trips never contend. Location
//! events for one trip are processed in non-decreasing timestamp order; no
//! component performs external I/O while holding a seat mutex.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

pub mod availability;
pub mod coordinator;
pub mod effect;
pub mod engine;
pub mod environment;
pub mod error;
pub mod events;
pub(crate) mod ingest;
pub mod ledger;
pub mod occupancy;
pub mod reducer;
pub mod reservation;
pub mod segment;
pub mod store;
pub mod types;

pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use events::{EngineEvent, EventPublisher};
pub use ledger::SeatLedger;
pub use reservation::{Reservation, ReservationStatus, TransitionKind, TransitionRecord};
pub use segment::{Segment, StopIndex};
pub use types::{
    Actor, DriverId, GeoPoint, PassengerId, ReservationId, SeatNumber, Stop, StopId, Trip, TripId,
    VehicleId,
};
