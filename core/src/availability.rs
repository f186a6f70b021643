//! Availability Query Service: which seats are free for a segment.
//!
//! Read-only. Every query is answered against live ledger state; there is
//! no cache to go stale, which is the whole point of dynamic substitution:
//! a seat freed by a drop-off is bookable the moment the seat mutex is
//! released.

use crate::error::EngineError;
use crate::ledger::SeatLedger;
use crate::types::{SeatNumber, StopId, TripId};
use std::sync::Arc;

/// Answers "which seats are free for segment [a, b)".
pub struct AvailabilityService {
    ledger: Arc<SeatLedger>,
}

impl AvailabilityService {
    /// Creates the service over the given ledger.
    #[must_use]
    pub fn new(ledger: Arc<SeatLedger>) -> Self {
        Self { ledger }
    }

    /// Seats with no blocking reservation overlapping the requested
    /// segment, in seat-number order.
    ///
    /// # Errors
    ///
    /// [`EngineError::TripNotFound`], [`EngineError::UnknownStop`] or
    /// [`EngineError::InvalidSegment`] when the query itself is malformed.
    pub async fn available_seats(
        &self,
        trip_id: TripId,
        boarding: StopId,
        dropoff: StopId,
    ) -> Result<Vec<SeatNumber>, EngineError> {
        let trip = self.ledger.trip(trip_id).await?;
        let segment = trip.index.segment_of(boarding, dropoff)?;

        let mut free = Vec::new();
        for (seat, slot) in trip.seats_in_order() {
            let state = slot.lock().await;
            if !state.would_overlap(segment) {
                free.push(seat.clone());
            }
        }
        tracing::debug!(%trip_id, %segment, free = free.len(), "availability query");
        Ok(free)
    }
}
