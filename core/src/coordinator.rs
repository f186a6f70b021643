//! Reservation Coordinator: the serialized write path for bookings.
//!
//! Validation (trip lookup, segment construction) happens before any lock
//! is taken; the conflict check and the insert then happen atomically under
//! the per-(trip, seat) mutex inside the ledger. Two concurrent `reserve`
//! calls for the same seat and overlapping segments therefore resolve to
//! exactly one winner; the loser gets [`EngineError::SeatSegmentConflict`]
//! and must pick a different seat or segment; there is no retry or queue.
//!
//! Nothing here performs external I/O while a seat mutex is held. Anything
//! slow (payment capture, notification delivery) belongs before the call or
//! downstream of the published event.

use crate::environment::Clock;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventPublisher};
use crate::ledger::SeatLedger;
use crate::reservation::Reservation;
use crate::types::{Actor, PassengerId, ReservationId, SeatNumber, StopId, TripId};
use std::sync::Arc;

/// Serializes booking requests per (trip, seat) and publishes the outcome.
pub struct ReservationCoordinator {
    ledger: Arc<SeatLedger>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl ReservationCoordinator {
    /// Creates a coordinator over the given ledger.
    #[must_use]
    pub fn new(ledger: Arc<SeatLedger>, publisher: EventPublisher, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            publisher,
            clock,
        }
    }

    /// Books `seat` for the segment between two stops.
    ///
    /// A seat already occupied for an earlier, disjoint segment can still be
    /// reserved for a later one (pre-emptive booking).
    ///
    /// # Errors
    ///
    /// [`EngineError::TripNotFound`], [`EngineError::UnknownStop`],
    /// [`EngineError::InvalidSegment`], [`EngineError::UnknownSeat`] for bad
    /// input; [`EngineError::SeatSegmentConflict`] when the segment is
    /// already held.
    pub async fn reserve(
        &self,
        trip_id: TripId,
        seat: SeatNumber,
        boarding: StopId,
        dropoff: StopId,
        passenger_id: PassengerId,
    ) -> Result<Reservation, EngineError> {
        let trip = self.ledger.trip(trip_id).await?;
        let segment = trip.index.segment_of(boarding, dropoff)?;

        let reservation = match self
            .ledger
            .try_reserve(&trip, seat, segment, passenger_id, self.clock.now())
            .await
        {
            Ok(reservation) => reservation,
            Err(err) => {
                if matches!(err, EngineError::SeatSegmentConflict { .. }) {
                    metrics::counter!("trotro_reservation_conflicts_total").increment(1);
                    tracing::info!(%trip_id, %segment, "reservation conflict");
                }
                return Err(err);
            }
        };

        metrics::counter!("trotro_reservations_created_total").increment(1);
        tracing::info!(
            reservation_id = %reservation.id,
            %trip_id,
            seat = %reservation.seat,
            %segment,
            "reservation created"
        );
        self.publisher.publish(EngineEvent::ReservationCreated {
            reservation_id: reservation.id,
            trip_id,
            seat: reservation.seat.clone(),
            segment,
            passenger_id,
            at: reservation.created_at,
        });
        Ok(reservation)
    }

    /// Cancels a reservation, freeing its segment immediately.
    ///
    /// Permitted while the reservation is `Booked` or `OnBoard`.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservationNotFound`];
    /// [`EngineError::NotCancellable`] once the reservation completed.
    pub async fn cancel(
        &self,
        id: ReservationId,
        reason: &str,
        actor: Actor,
    ) -> Result<Reservation, EngineError> {
        let at = self.clock.now();
        let reservation = self.ledger.apply_cancel(id, reason, actor, at).await?;

        tracing::info!(reservation_id = %id, %actor, reason, "reservation cancelled");
        self.publisher.publish(EngineEvent::ReservationCancelled {
            reservation_id: id,
            trip_id: reservation.trip_id,
            seat: reservation.seat.clone(),
            segment: reservation.segment,
            reason: reason.to_string(),
            actor,
            at,
        });
        Ok(reservation)
    }
}
