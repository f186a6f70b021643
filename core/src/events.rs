//! Engine event stream for downstream consumers.
//!
//! Every reservation and occupancy transition is published as an
//! [`EngineEvent`] on a broadcast channel. Publishing is fire-and-forget:
//! the engine never blocks on delivery, and a consumer that falls behind
//! the channel capacity simply observes a lag error on its receiver.

use crate::segment::Segment;
use crate::types::{Actor, PassengerId, ReservationId, SeatNumber, TripId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Reservation and occupancy transition events.
///
/// Each variant carries the reservation id, trip id, seat, segment and
/// timestamp, so notification/analytics consumers never need to query the
/// ledger to make sense of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A reservation was created as `Booked`.
    ReservationCreated {
        /// New reservation
        reservation_id: ReservationId,
        /// Trip booked
        trip_id: TripId,
        /// Seat booked
        seat: SeatNumber,
        /// Segment held
        segment: Segment,
        /// Owning passenger
        passenger_id: PassengerId,
        /// Creation time
        at: DateTime<Utc>,
    },

    /// A passenger boarded (auto-detected or driver-confirmed).
    BoardingConfirmed {
        /// Reservation boarded
        reservation_id: ReservationId,
        /// Trip
        trip_id: TripId,
        /// Seat
        seat: SeatNumber,
        /// Segment held
        segment: Segment,
        /// `Actor::System` for geofence auto-detection, `Actor::Driver` for
        /// a manual override
        actor: Actor,
        /// Boarding time
        at: DateTime<Utc>,
    },

    /// A passenger alighted; the seat's segment is free again.
    DropoffCompleted {
        /// Reservation completed
        reservation_id: ReservationId,
        /// Trip
        trip_id: TripId,
        /// Seat freed
        seat: SeatNumber,
        /// Segment freed
        segment: Segment,
        /// Detection or override actor
        actor: Actor,
        /// Drop-off time
        at: DateTime<Utc>,
    },

    /// The vehicle passed a boarding stop without a corroborated passenger
    /// match; the reservation stays `Booked` pending follow-up.
    BoardingMissed {
        /// Reservation flagged
        reservation_id: ReservationId,
        /// Trip
        trip_id: TripId,
        /// Seat
        seat: SeatNumber,
        /// Segment held
        segment: Segment,
        /// Route index of the missed boarding stop
        stop_index: usize,
        /// When the flag was raised
        at: DateTime<Utc>,
    },

    /// A reservation was cancelled; its segment is free again.
    ReservationCancelled {
        /// Reservation cancelled
        reservation_id: ReservationId,
        /// Trip
        trip_id: TripId,
        /// Seat freed
        seat: SeatNumber,
        /// Segment freed
        segment: Segment,
        /// Caller-supplied reason
        reason: String,
        /// Cancelling actor
        actor: Actor,
        /// Cancellation time
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// The reservation the event concerns.
    #[must_use]
    pub const fn reservation_id(&self) -> ReservationId {
        match self {
            Self::ReservationCreated { reservation_id, .. }
            | Self::BoardingConfirmed { reservation_id, .. }
            | Self::DropoffCompleted { reservation_id, .. }
            | Self::BoardingMissed { reservation_id, .. }
            | Self::ReservationCancelled { reservation_id, .. } => *reservation_id,
        }
    }

    /// The trip the event concerns.
    #[must_use]
    pub const fn trip_id(&self) -> TripId {
        match self {
            Self::ReservationCreated { trip_id, .. }
            | Self::BoardingConfirmed { trip_id, .. }
            | Self::DropoffCompleted { trip_id, .. }
            | Self::BoardingMissed { trip_id, .. }
            | Self::ReservationCancelled { trip_id, .. } => *trip_id,
        }
    }

    /// Stable event name, used as the SSE event type and in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReservationCreated { .. } => "reservation-created",
            Self::BoardingConfirmed { .. } => "boarding-confirmed",
            Self::DropoffCompleted { .. } => "dropoff-completed",
            Self::BoardingMissed { .. } => "boarding-missed",
            Self::ReservationCancelled { .. } => "reservation-cancelled",
        }
    }
}

/// Fire-and-forget publisher over a tokio broadcast channel.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventPublisher {
    /// Creates a publisher with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Having no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: EngineEvent) {
        tracing::debug!(
            event = event.name(),
            reservation_id = %event.reservation_id(),
            trip_id = %event.trip_id(),
            "publishing engine event"
        );
        metrics::counter!("trotro_events_published_total").increment(1);
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers; event dropped");
        }
    }

    /// Subscribes to the event stream from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::segment::Segment;

    fn created_event() -> EngineEvent {
        EngineEvent::ReservationCreated {
            reservation_id: ReservationId::new(),
            trip_id: TripId::new(),
            seat: SeatNumber::from("A1"),
            segment: Segment::new(0, 1, 2).unwrap(),
            passenger_id: PassengerId::new(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let publisher = EventPublisher::default();
        publisher.publish(created_event());
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = EventPublisher::default();
        let mut rx = publisher.subscribe();

        let event = created_event();
        publisher.publish(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
        assert_eq!(received.name(), "reservation-created");
    }
}
