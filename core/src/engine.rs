//! The engine facade: wiring and the exposed operation surface.
//!
//! [`Engine`] owns the ledger, the coordinator, the availability service
//! and one occupancy store per registered trip, and exposes the operations
//! collaborating services call. Identity is taken on trust: the
//! authentication boundary in front of the engine has already verified the
//! actor on every mutating call.

use crate::availability::AvailabilityService;
use crate::coordinator::ReservationCoordinator;
use crate::environment::{Clock, SystemClock};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventPublisher, DEFAULT_EVENT_BUFFER};
use crate::ledger::SeatLedger;
use crate::occupancy::{OccupancyAction, OccupancyEnvironment};
use crate::reservation::{Reservation, TransitionRecord};
use crate::store::OccupancyStore;
use crate::types::{Actor, GeoPoint, PassengerId, ReservationId, SeatNumber, StopId, Trip, TripId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Tunables for the engine.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// How long after the vehicle reaches a boarding stop a passenger match
    /// is still accepted before the reservation is flagged missed
    pub grace_window: Duration,
    /// Capacity of the engine event broadcast channel
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(120),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// The segment-based seat reservation and occupancy engine.
pub struct Engine {
    ledger: Arc<SeatLedger>,
    coordinator: ReservationCoordinator,
    availability: AvailabilityService,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    monitors: RwLock<HashMap<TripId, OccupancyStore>>,
}

impl Engine {
    /// Creates an engine on the system clock.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an engine with an injected clock (deterministic tests).
    #[must_use]
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger = Arc::new(SeatLedger::new());
        let publisher = EventPublisher::new(config.event_buffer);
        let coordinator = ReservationCoordinator::new(
            Arc::clone(&ledger),
            publisher.clone(),
            Arc::clone(&clock),
        );
        let availability = AvailabilityService::new(Arc::clone(&ledger));
        Self {
            ledger,
            coordinator,
            availability,
            publisher,
            clock,
            config,
            monitors: RwLock::new(HashMap::new()),
        }
    }

    async fn monitor(&self, trip_id: TripId) -> Result<OccupancyStore, EngineError> {
        self.monitors
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .ok_or(EngineError::TripNotFound(trip_id))
    }

    // ------------------------------------------------------------------
    // Trip management
    // ------------------------------------------------------------------

    /// Registers a trip and spins up its occupancy machine.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidTrip`] for unusable definitions,
    /// [`EngineError::TripExists`] on duplicate registration.
    pub async fn register_trip(&self, trip: Trip) -> Result<(), EngineError> {
        let trip_id = trip.id;
        let trip_ledger = self
            .ledger
            .register_trip(trip, self.clock.now())
            .await?;

        let env = OccupancyEnvironment::new(
            Arc::clone(&trip_ledger.trip),
            Arc::clone(&self.ledger),
            self.publisher.clone(),
            Arc::clone(&self.clock),
            self.config.grace_window,
        );
        self.monitors
            .write()
            .await
            .insert(trip_id, OccupancyStore::new(env));
        tracing::info!(%trip_id, "trip registered");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Booking (write path)
    // ------------------------------------------------------------------

    /// Books a seat for the segment between two stops.
    ///
    /// # Errors
    ///
    /// See [`ReservationCoordinator::reserve`].
    pub async fn reserve(
        &self,
        trip_id: TripId,
        seat: SeatNumber,
        boarding: StopId,
        dropoff: StopId,
        passenger_id: PassengerId,
    ) -> Result<Reservation, EngineError> {
        let reservation = self
            .coordinator
            .reserve(trip_id, seat, boarding, dropoff, passenger_id)
            .await?;
        if let Ok(monitor) = self.monitor(trip_id).await {
            monitor
                .send(OccupancyAction::ReservationBooked {
                    reservation_id: reservation.id,
                    seat: reservation.seat.clone(),
                    segment: reservation.segment,
                    passenger_id,
                })
                .await;
        }
        Ok(reservation)
    }

    /// Cancels a reservation, freeing its segment immediately.
    ///
    /// # Errors
    ///
    /// See [`ReservationCoordinator::cancel`].
    pub async fn cancel(
        &self,
        id: ReservationId,
        reason: &str,
        actor: Actor,
    ) -> Result<(), EngineError> {
        let reservation = self.coordinator.cancel(id, reason, actor).await?;
        if let Ok(monitor) = self.monitor(reservation.trip_id).await {
            monitor
                .send(OccupancyAction::ReservationCancelled {
                    reservation_id: id,
                })
                .await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Availability (read path)
    // ------------------------------------------------------------------

    /// Seats free for the segment between two stops, in seat-number order.
    ///
    /// # Errors
    ///
    /// See [`AvailabilityService::available_seats`].
    pub async fn available_seats(
        &self,
        trip_id: TripId,
        boarding: StopId,
        dropoff: StopId,
    ) -> Result<Vec<SeatNumber>, EngineError> {
        self.availability
            .available_seats(trip_id, boarding, dropoff)
            .await
    }

    // ------------------------------------------------------------------
    // Location feed
    // ------------------------------------------------------------------

    /// Feeds one vehicle GPS fix into the trip's occupancy machine.
    ///
    /// # Errors
    ///
    /// [`EngineError::TripNotFound`]. Stale or unmatched fixes are logged
    /// and dropped, never surfaced.
    pub async fn report_vehicle_location(
        &self,
        trip_id: TripId,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let monitor = self.monitor(trip_id).await?;
        monitor
            .send(OccupancyAction::VehiclePing { position, at })
            .await;
        Ok(())
    }

    /// Feeds one passenger position update, matched against the boarding
    /// stop of their reservation.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservationNotFound`].
    pub async fn report_passenger_location(
        &self,
        reservation_id: ReservationId,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let reservation = self.ledger.reservation(reservation_id).await?;
        let monitor = self.monitor(reservation.trip_id).await?;
        monitor
            .send(OccupancyAction::PassengerPing {
                reservation_id,
                position,
                at,
            })
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Driver overrides
    // ------------------------------------------------------------------

    /// Driver-confirmed boarding. Always accepted regardless of what
    /// auto-detection has or hasn't seen, to cover GPS noise and detection
    /// failure.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservationNotFound`] or
    /// [`EngineError::InvalidTransition`] when the reservation is not
    /// `Booked`.
    pub async fn confirm_boarding(
        &self,
        id: ReservationId,
        actor: Actor,
    ) -> Result<(), EngineError> {
        let at = self.clock.now();
        let reservation = self.ledger.apply_boarding(id, actor, at).await?;
        metrics::counter!("trotro_manual_overrides_total").increment(1);
        tracing::info!(reservation_id = %id, %actor, "boarding confirmed by override");
        self.publisher.publish(EngineEvent::BoardingConfirmed {
            reservation_id: id,
            trip_id: reservation.trip_id,
            seat: reservation.seat.clone(),
            segment: reservation.segment,
            actor,
            at,
        });
        if let Ok(monitor) = self.monitor(reservation.trip_id).await {
            monitor
                .send(OccupancyAction::BoardingConfirmed {
                    reservation_id: id,
                })
                .await;
        }
        Ok(())
    }

    /// Driver-confirmed drop-off; the seat's segment frees immediately.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservationNotFound`] or
    /// [`EngineError::InvalidTransition`] when the reservation is not
    /// `OnBoard`.
    pub async fn confirm_dropoff(
        &self,
        id: ReservationId,
        actor: Actor,
    ) -> Result<(), EngineError> {
        let at = self.clock.now();
        let reservation = self.ledger.apply_dropoff(id, actor, at).await?;
        metrics::counter!("trotro_manual_overrides_total").increment(1);
        tracing::info!(reservation_id = %id, %actor, "drop-off confirmed by override");
        self.publisher.publish(EngineEvent::DropoffCompleted {
            reservation_id: id,
            trip_id: reservation.trip_id,
            seat: reservation.seat.clone(),
            segment: reservation.segment,
            actor,
            at,
        });
        if let Ok(monitor) = self.monitor(reservation.trip_id).await {
            monitor
                .send(OccupancyAction::DropoffCompleted {
                    reservation_id: id,
                })
                .await;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups and event stream
    // ------------------------------------------------------------------

    /// A point-in-time snapshot of one reservation.
    ///
    /// # Errors
    ///
    /// [`EngineError::ReservationNotFound`].
    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.ledger.reservation(id).await
    }

    /// The ordered, non-cancelled reservation set for one (trip, seat).
    ///
    /// # Errors
    ///
    /// [`EngineError::TripNotFound`] or [`EngineError::UnknownSeat`].
    pub async fn reservations_for(
        &self,
        trip_id: TripId,
        seat: &SeatNumber,
    ) -> Result<Vec<Reservation>, EngineError> {
        self.ledger.reservations_for(trip_id, seat).await
    }

    /// One passenger's reservation history, newest first.
    pub async fn reservations_for_passenger(&self, passenger: PassengerId) -> Vec<Reservation> {
        self.ledger.reservations_for_passenger(passenger).await
    }

    /// The append-only transition journal for a trip.
    ///
    /// # Errors
    ///
    /// [`EngineError::TripNotFound`].
    pub async fn audit_log(&self, trip_id: TripId) -> Result<Vec<TransitionRecord>, EngineError> {
        self.ledger.audit_log(trip_id).await
    }

    /// Subscribes to the engine event stream from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.publisher.subscribe()
    }
}
