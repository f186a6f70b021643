//! Error taxonomy for the engine's service boundary.
//!
//! Every variant maps to a distinct caller-facing condition so the layer in
//! front of the engine can present an accurate message: "seat unavailable
//! for this segment" is not "seat does not exist" is not "trip not found".
//! Location-processing problems (stale pings, unmatched geofence events) are
//! deliberately absent; they are logged and metered, never surfaced, since
//! location ingest has no synchronous caller.

use crate::reservation::ReservationStatus;
use crate::segment::Segment;
use crate::types::{ReservationId, SeatNumber, StopId, TripId};
use thiserror::Error;

/// Errors returned by the engine's reservation, availability and override
/// operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The trip id is not registered with the engine.
    #[error("trip {0} not found")]
    TripNotFound(TripId),

    /// A trip with this id is already registered; trips are immutable.
    #[error("trip {0} is already registered")]
    TripExists(TripId),

    /// The trip definition itself is unusable (too few stops, no seats,
    /// duplicate stop ids).
    #[error("invalid trip definition: {0}")]
    InvalidTrip(String),

    /// The stop id is not part of the trip's route.
    #[error("stop {0} is not part of the trip")]
    UnknownStop(StopId),

    /// The seat is not part of the trip's inventory.
    #[error("seat {seat} does not exist on trip {trip_id}")]
    UnknownSeat {
        /// Trip queried
        trip_id: TripId,
        /// Seat that does not exist
        seat: SeatNumber,
    },

    /// The (boarding, drop-off) pair does not form a forward interval on the
    /// route.
    #[error("invalid segment: {reason}")]
    InvalidSegment {
        /// Why the interval is unusable
        reason: String,
    },

    /// The seat already holds a blocking reservation overlapping the
    /// requested segment. Expected under concurrent demand; the caller must
    /// pick another seat or segment, since the engine never queues or retries.
    #[error("seat {seat} already holds a reservation overlapping segment {segment}")]
    SeatSegmentConflict {
        /// Contested seat
        seat: SeatNumber,
        /// Requested segment
        segment: Segment,
    },

    /// No reservation with this id exists.
    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// Cancellation was requested for a reservation that already reached a
    /// terminal state.
    #[error("reservation {id} can no longer be cancelled (status: {status})")]
    NotCancellable {
        /// Reservation the caller tried to cancel
        id: ReservationId,
        /// Its current status
        status: ReservationStatus,
    },

    /// A status transition was requested that the state machine does not
    /// permit; the caller is out of sync with the reservation's state.
    #[error("reservation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Reservation involved
        id: ReservationId,
        /// Current status
        from: ReservationStatus,
        /// Requested status
        to: ReservationStatus,
    },
}
