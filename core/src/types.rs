//! Domain types for the trotro seat engine.
//!
//! Value objects and entities shared across the engine: identifiers, seat
//! numbers, geocoordinates, stops and trips. A trip is immutable for the
//! engine's whole interest in it; everything mutable lives in the ledger.

use chrono::{DateTime, Utc};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a trip (one scheduled run of one vehicle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripId(Uuid);

impl TripId {
    /// Creates a new random `TripId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TripId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VehicleId(Uuid);

impl VehicleId {
    /// Creates a new random `VehicleId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `VehicleId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for VehicleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stop on a trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StopId(Uuid);

impl StopId {
    /// Creates a new random `StopId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `StopId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StopId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a passenger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassengerId(Uuid);

impl PassengerId {
    /// Creates a new random `PassengerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PassengerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PassengerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PassengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(Uuid);

impl DriverId {
    /// Creates a new random `DriverId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `DriverId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for DriverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Seat numbers
// ============================================================================

/// A named physical seat on a vehicle (e.g. "A1", "B3").
///
/// Seat numbers are compared lexicographically; the availability query
/// returns seats in this order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeatNumber(String);

impl SeatNumber {
    /// Creates a `SeatNumber` from a label
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The seat label
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeatNumber {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

// ============================================================================
// Actors
// ============================================================================

/// Who performed a mutating operation.
///
/// Every state transition is journaled with its actor so disputed
/// boarding/drop-off events can be investigated after the fact. The engine
/// trusts the identity handed to it by the authentication boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    /// Automatic transition driven by geofence detection
    System,
    /// Driver-initiated manual override
    Driver(DriverId),
    /// Passenger-initiated action (booking, cancellation)
    Passenger(PassengerId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Driver(id) => write!(f, "driver:{id}"),
            Self::Passenger(id) => write!(f, "passenger:{id}"),
        }
    }
}

// ============================================================================
// Geography
// ============================================================================

/// A WGS84 coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a new `GeoPoint`
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Haversine distance to another point, in meters.
    #[must_use]
    pub fn distance_meters(&self, other: Self) -> f64 {
        let a = Point::new(self.lon, self.lat);
        let b = Point::new(other.lon, other.lat);
        a.haversine_distance(&b)
    }
}

/// Default circular geofence radius around a stop, in meters.
pub const DEFAULT_FENCE_RADIUS_M: f64 = 30.0;

/// A stop on a trip's route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Stop identifier
    pub id: StopId,
    /// Human-readable stop name (e.g. "Circle", "Lapaz")
    pub name: String,
    /// Stop location
    pub position: GeoPoint,
    /// Radius of the circular detection geofence, in meters
    pub fence_radius_m: f64,
}

impl Stop {
    /// Creates a stop with the default geofence radius.
    #[must_use]
    pub fn new(id: StopId, name: impl Into<String>, position: GeoPoint) -> Self {
        Self {
            id,
            name: name.into(),
            position,
            fence_radius_m: DEFAULT_FENCE_RADIUS_M,
        }
    }

    /// Override the geofence radius.
    #[must_use]
    pub fn with_fence_radius(mut self, radius_m: f64) -> Self {
        self.fence_radius_m = radius_m;
        self
    }

    /// Whether `position` lies within this stop's geofence.
    #[must_use]
    pub fn contains(&self, position: GeoPoint) -> bool {
        self.position.distance_meters(position) <= self.fence_radius_m
    }
}

// ============================================================================
// Trips
// ============================================================================

/// A scheduled run of one vehicle over an ordered sequence of stops.
///
/// Trips are immutable once registered: the stop order and the seat
/// inventory never change while the engine holds the trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip identifier
    pub id: TripId,
    /// Vehicle operating the trip
    pub vehicle_id: VehicleId,
    /// Ordered stop list; index 0 is the origin
    pub stops: Vec<Stop>,
    /// Seat inventory, sorted by seat number
    pub seats: Vec<SeatNumber>,
    /// When the trip was registered with the engine
    pub registered_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Creates a new trip. Seats are sorted and deduplicated.
    #[must_use]
    pub fn new(
        id: TripId,
        vehicle_id: VehicleId,
        stops: Vec<Stop>,
        mut seats: Vec<SeatNumber>,
    ) -> Self {
        seats.sort();
        seats.dedup();
        Self {
            id,
            vehicle_id,
            stops,
            seats,
            registered_at: None,
        }
    }

    /// Number of stops on the route.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    /// Whether the trip's inventory includes `seat`.
    #[must_use]
    pub fn has_seat(&self, seat: &SeatNumber) -> bool {
        self.seats.binary_search(seat).is_ok()
    }
}
