//! Seat Ledger: the authoritative store of reservations per trip.
//!
//! The ledger owns the central correctness invariant of the engine: for any
//! (trip, seat), the segments of all *blocking* reservations (`Booked` or
//! `OnBoard`) are pairwise disjoint. `Completed` and `Cancelled`
//! reservations are retained for audit but excluded from the overlap set,
//! which is what makes a just-freed seat immediately bookable again.
//!
//! Concurrency discipline: each (trip, seat) pair gets its own async mutex,
//! created when the trip is registered (the inventory is fixed, so the lock
//! map never mutates afterwards). Conflict checking and insertion happen
//! under that lock; operations on different seats or different trips never
//! contend. Status transitions go through the same per-seat mutex, so
//! occupancy detection and booking share one exclusion boundary.
//!
//! Mutating methods are `pub(crate)`: new reservations and cancellations
//! enter through the Reservation Coordinator, status transitions through
//! the Occupancy State Machine.

use crate::error::EngineError;
use crate::reservation::{Reservation, TransitionKind, TransitionRecord};
use crate::segment::{Segment, StopIndex};
use crate::types::{Actor, PassengerId, ReservationId, SeatNumber, Trip, TripId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

// ============================================================================
// Per-seat state
// ============================================================================

/// All reservations ever made for one (trip, seat), ordered by segment
/// start. Only ever touched while holding the seat's mutex.
#[derive(Debug, Default)]
pub(crate) struct SeatState {
    reservations: Vec<Reservation>,
}

impl SeatState {
    /// True iff inserting `segment` would violate the disjointness
    /// invariant. Linear scan: seat counts are tens per trip, and each seat
    /// holds a handful of reservations, so no interval tree is warranted.
    pub(crate) fn would_overlap(&self, segment: Segment) -> bool {
        self.reservations
            .iter()
            .any(|r| r.blocks() && r.segment.overlaps(&segment))
    }

    /// Inserts a reservation, keeping the set ordered by boarding index.
    ///
    /// The caller must have checked `would_overlap` under the same lock.
    fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.segment.boarding() <= reservation.segment.boarding());
        self.reservations.insert(pos, reservation);
    }

    fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Non-cancelled reservations in segment order.
    fn non_cancelled(&self) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|r| r.cancelled_at.is_none())
            .cloned()
            .collect()
    }
}

// ============================================================================
// Per-trip ledger
// ============================================================================

/// Ledger slice for one registered trip.
pub(crate) struct TripLedger {
    /// The immutable trip definition
    pub(crate) trip: Arc<Trip>,
    /// Stop-id → route-position index, built once at registration
    pub(crate) index: StopIndex,
    seats: BTreeMap<SeatNumber, Arc<Mutex<SeatState>>>,
    journal: Mutex<Vec<TransitionRecord>>,
}

impl TripLedger {
    fn new(trip: Trip) -> Self {
        let index = StopIndex::new(&trip.stops);
        let seats = trip
            .seats
            .iter()
            .map(|seat| (seat.clone(), Arc::new(Mutex::new(SeatState::default()))))
            .collect();
        Self {
            trip: Arc::new(trip),
            index,
            seats,
            journal: Mutex::new(Vec::new()),
        }
    }

    /// The mutex-guarded state for one seat.
    pub(crate) fn seat_slot(
        &self,
        seat: &SeatNumber,
    ) -> Result<&Arc<Mutex<SeatState>>, EngineError> {
        self.seats.get(seat).ok_or_else(|| EngineError::UnknownSeat {
            trip_id: self.trip.id,
            seat: seat.clone(),
        })
    }

    /// Seat slots in seat-number order.
    pub(crate) fn seats_in_order(
        &self,
    ) -> impl Iterator<Item = (&SeatNumber, &Arc<Mutex<SeatState>>)> {
        self.seats.iter()
    }

    async fn journal_append(&self, record: TransitionRecord) {
        self.journal.lock().await.push(record);
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Where a reservation lives, for id-based lookups.
#[derive(Clone, Debug)]
pub(crate) struct Locator {
    pub(crate) trip_id: TripId,
    pub(crate) seat: SeatNumber,
}

/// The authoritative reservation store for all registered trips.
#[derive(Default)]
pub struct SeatLedger {
    trips: RwLock<HashMap<TripId, Arc<TripLedger>>>,
    locators: RwLock<HashMap<ReservationId, Locator>>,
    by_passenger: RwLock<HashMap<PassengerId, Vec<ReservationId>>>,
}

impl SeatLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a trip, creating one seat slot (and one mutex) per seat.
    pub(crate) async fn register_trip(
        &self,
        mut trip: Trip,
        at: DateTime<Utc>,
    ) -> Result<Arc<TripLedger>, EngineError> {
        if trip.stops.len() < 2 {
            return Err(EngineError::InvalidTrip(
                "a trip needs at least two stops".to_string(),
            ));
        }
        if trip.seats.is_empty() {
            return Err(EngineError::InvalidTrip(
                "a trip needs at least one seat".to_string(),
            ));
        }
        let index = StopIndex::new(&trip.stops);
        if trip
            .stops
            .iter()
            .enumerate()
            .any(|(i, stop)| index.position_of(stop.id) != Some(i))
        {
            return Err(EngineError::InvalidTrip(
                "stop ids must be unique within a trip".to_string(),
            ));
        }
        trip.registered_at = Some(at);

        let mut trips = self.trips.write().await;
        if trips.contains_key(&trip.id) {
            return Err(EngineError::TripExists(trip.id));
        }
        let ledger = Arc::new(TripLedger::new(trip));
        trips.insert(ledger.trip.id, Arc::clone(&ledger));
        Ok(ledger)
    }

    /// The per-trip ledger slice.
    pub(crate) async fn trip(&self, trip_id: TripId) -> Result<Arc<TripLedger>, EngineError> {
        self.trips
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .ok_or(EngineError::TripNotFound(trip_id))
    }

    pub(crate) async fn locator(&self, id: ReservationId) -> Result<Locator, EngineError> {
        self.locators
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// The ordered, non-cancelled reservation set for one (trip, seat).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TripNotFound`] or [`EngineError::UnknownSeat`].
    pub async fn reservations_for(
        &self,
        trip_id: TripId,
        seat: &SeatNumber,
    ) -> Result<Vec<Reservation>, EngineError> {
        let trip = self.trip(trip_id).await?;
        let slot = trip.seat_slot(seat)?;
        Ok(slot.lock().await.non_cancelled())
    }

    /// True iff inserting `segment` for (trip, seat) would violate the
    /// disjointness invariant right now.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TripNotFound`] or [`EngineError::UnknownSeat`].
    pub async fn would_overlap(
        &self,
        trip_id: TripId,
        seat: &SeatNumber,
        segment: Segment,
    ) -> Result<bool, EngineError> {
        let trip = self.trip(trip_id).await?;
        let slot = trip.seat_slot(seat)?;
        Ok(slot.lock().await.would_overlap(segment))
    }

    /// A point-in-time snapshot of one reservation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReservationNotFound`].
    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let locator = self.locator(id).await?;
        let trip = self.trip(locator.trip_id).await?;
        let slot = trip.seat_slot(&locator.seat)?;
        let mut state = slot.lock().await;
        state
            .get_mut(id)
            .map(|r| r.clone())
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// All reservations ever made by one passenger, newest first.
    pub async fn reservations_for_passenger(&self, passenger: PassengerId) -> Vec<Reservation> {
        let ids = self
            .by_passenger
            .read()
            .await
            .get(&passenger)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(reservation) = self.reservation(id).await {
                out.push(reservation);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// The append-only transition journal for a trip.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::TripNotFound`].
    pub async fn audit_log(&self, trip_id: TripId) -> Result<Vec<TransitionRecord>, EngineError> {
        let trip = self.trip(trip_id).await?;
        Ok(trip.journal.lock().await.clone())
    }

    // ------------------------------------------------------------------
    // Write path (coordinator / occupancy machine only)
    // ------------------------------------------------------------------

    /// Atomically checks the disjointness invariant and inserts a `Booked`
    /// reservation, all under the seat's mutex.
    pub(crate) async fn try_reserve(
        &self,
        trip: &TripLedger,
        seat: SeatNumber,
        segment: Segment,
        passenger_id: PassengerId,
        at: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let slot = trip.seat_slot(&seat)?;
        let reservation = {
            let mut state = slot.lock().await;
            if state.would_overlap(segment) {
                return Err(EngineError::SeatSegmentConflict { seat, segment });
            }
            let reservation = Reservation::new(
                ReservationId::new(),
                trip.trip.id,
                seat,
                segment,
                passenger_id,
                at,
            );
            state.insert(reservation.clone());
            reservation
        };

        self.locators.write().await.insert(
            reservation.id,
            Locator {
                trip_id: reservation.trip_id,
                seat: reservation.seat.clone(),
            },
        );
        self.by_passenger
            .write()
            .await
            .entry(passenger_id)
            .or_default()
            .push(reservation.id);
        trip.journal_append(TransitionRecord {
            reservation_id: reservation.id,
            trip_id: reservation.trip_id,
            seat: reservation.seat.clone(),
            kind: TransitionKind::Created,
            actor: Actor::Passenger(passenger_id),
            at,
        })
        .await;
        Ok(reservation)
    }

    /// `Booked → OnBoard`, journaled with the driving actor.
    pub(crate) async fn apply_boarding(
        &self,
        id: ReservationId,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let locator = self.locator(id).await?;
        let trip = self.trip(locator.trip_id).await?;
        let slot = trip.seat_slot(&locator.seat)?;
        let snapshot = {
            let mut state = slot.lock().await;
            let reservation = state
                .get_mut(id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            reservation.board(at)?;
            reservation.clone()
        };
        trip.journal_append(TransitionRecord {
            reservation_id: id,
            trip_id: snapshot.trip_id,
            seat: snapshot.seat.clone(),
            kind: TransitionKind::Boarded,
            actor,
            at,
        })
        .await;
        Ok(snapshot)
    }

    /// `OnBoard → Completed`, journaled. The freed segment is visible to
    /// availability queries the moment the seat mutex is released.
    pub(crate) async fn apply_dropoff(
        &self,
        id: ReservationId,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let locator = self.locator(id).await?;
        let trip = self.trip(locator.trip_id).await?;
        let slot = trip.seat_slot(&locator.seat)?;
        let snapshot = {
            let mut state = slot.lock().await;
            let reservation = state
                .get_mut(id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            reservation.complete(at)?;
            reservation.clone()
        };
        trip.journal_append(TransitionRecord {
            reservation_id: id,
            trip_id: snapshot.trip_id,
            seat: snapshot.seat.clone(),
            kind: TransitionKind::Completed,
            actor,
            at,
        })
        .await;
        Ok(snapshot)
    }

    /// `Booked | OnBoard → Cancelled`, journaled.
    pub(crate) async fn apply_cancel(
        &self,
        id: ReservationId,
        reason: &str,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Reservation, EngineError> {
        let locator = self.locator(id).await?;
        let trip = self.trip(locator.trip_id).await?;
        let slot = trip.seat_slot(&locator.seat)?;
        let snapshot = {
            let mut state = slot.lock().await;
            let reservation = state
                .get_mut(id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            reservation.cancel(reason, at)?;
            reservation.clone()
        };
        trip.journal_append(TransitionRecord {
            reservation_id: id,
            trip_id: snapshot.trip_id,
            seat: snapshot.seat.clone(),
            kind: TransitionKind::Cancelled,
            actor,
            at,
        })
        .await;
        Ok(snapshot)
    }

    /// Raises the `boarding_missed` flag. Returns `Ok(None)` when the flag
    /// was already set or the reservation is no longer `Booked`, so repeat
    /// deliveries stay no-ops.
    pub(crate) async fn flag_boarding_missed(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>, EngineError> {
        let locator = self.locator(id).await?;
        let trip = self.trip(locator.trip_id).await?;
        let slot = trip.seat_slot(&locator.seat)?;
        let snapshot = {
            let mut state = slot.lock().await;
            let reservation = state
                .get_mut(id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            if !reservation.flag_missed() {
                return Ok(None);
            }
            reservation.clone()
        };
        trip.journal_append(TransitionRecord {
            reservation_id: id,
            trip_id: snapshot.trip_id,
            seat: snapshot.seat.clone(),
            kind: TransitionKind::BoardingMissed,
            actor: Actor::System,
            at,
        })
        .await;
        Ok(Some(snapshot))
    }
}
